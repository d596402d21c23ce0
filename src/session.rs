use crate::backend::Executor;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::resource::Resource;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::mem;
use std::sync::Arc;

pub mod blob;
pub mod resource;

/// A caller's handle to an executor.
///
/// Resources have to be registered with a session before operations can use
/// them. A session can only be released once every resource has been
/// unregistered; dropping a live session does both.
pub struct Session {
    id: u64,
    flags: u32,
    executor: Arc<dyn Executor>,
    resources: BTreeMap<u64, Resource>,
    released: bool,
}

impl Session {
    /// Starts a session on the executor named by the environment.
    pub fn init(flags: u32) -> Result<Self> {
        Self::with_config(&Config::from_env(), flags)
    }

    pub fn with_config(config: &Config, flags: u32) -> Result<Self> {
        Self::with_executor(config.executor()?, flags)
    }

    pub fn with_executor(executor: Arc<dyn Executor>, flags: u32) -> Result<Self> {
        let id = executor.session_init(flags)?;
        tracing::debug!(id, flags, executor = executor.name(), "session initialized");

        Ok(Session {
            id,
            flags,
            executor,
            resources: BTreeMap::new(),
            released: false,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.released {
            return Err(Error::invalid(format!("session {} has been released", self.id)));
        }
        Ok(())
    }

    pub(crate) fn ensure_registered(&self, resource: &Resource) -> Result<()> {
        if !self.is_registered(resource) {
            return Err(Error::NotRegistered {
                resource: resource.id(),
                session: self.id,
            });
        }
        Ok(())
    }

    pub fn register(&mut self, resource: &Resource) -> Result<()> {
        self.ensure_live()?;
        resource.ensure_live()?;

        if self.resources.contains_key(&resource.id()) {
            return Err(Error::AlreadyRegistered {
                resource: resource.id(),
                session: self.id,
            });
        }

        self.executor.register_resource(self, resource)?;
        let refs = resource.acquire();
        self.resources.insert(resource.id(), resource.clone());

        tracing::debug!(session = self.id, resource = resource.id(), refs, "resource registered");
        Ok(())
    }

    pub fn unregister(&mut self, resource: &Resource) -> Result<()> {
        self.ensure_live()?;

        let held = self.resources.remove(&resource.id()).ok_or(Error::NotRegistered {
            resource: resource.id(),
            session: self.id,
        })?;

        if let Err(e) = self.executor.unregister_resource(self, &held) {
            self.resources.insert(held.id(), held);
            return Err(e);
        }
        let refs = held.put()?;

        tracing::debug!(session = self.id, resource = held.id(), refs, "resource unregistered");
        Ok(())
    }

    pub fn is_registered(&self, resource: &Resource) -> bool {
        self.resources.contains_key(&resource.id())
    }

    /// Registered resource with the given id.
    pub fn resource(&self, id: u64) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn release(&mut self) -> Result<()> {
        self.ensure_live()?;

        if !self.resources.is_empty() {
            return Err(Error::Busy {
                what: format!("session {}", self.id),
                refs: self.resources.len(),
            });
        }

        self.executor.session_release(self.id)?;
        self.released = true;

        tracing::debug!(id = self.id, "session released");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let resources = mem::take(&mut self.resources);
        for resource in resources.values() {
            if let Err(e) = self.executor.unregister_resource(self, resource) {
                tracing::warn!(session = self.id, resource = resource.id(), error = %e, "unregister on drop failed");
            }
            if let Err(e) = resource.put() {
                tracing::warn!(session = self.id, resource = resource.id(), error = %e, "refcount already zero");
            }
        }

        if let Err(e) = self.executor.session_release(self.id) {
            tracing::error!(id = self.id, error = %e, "session release on drop failed");
        }
        self.released = true;
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("executor", &self.executor.name())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("released", &self.released)
            .finish()
    }
}
