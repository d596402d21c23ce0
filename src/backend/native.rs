use crate::args::Arg;
use crate::backend::Executor;
use crate::error::{Error, Result};
use crate::ops::OpType;
use crate::session::resource::{Resource, ResourceType};
use crate::session::Session;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// shared by every `Native` instance so session ids stay unique per process
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Host function callable through `Exec`: reads its inputs from the first
/// slice and fills the second.
pub type HostFn =
    Arc<dyn for<'x, 'y, 'r, 'w> Fn(&'x [Arg<'r>], &'y mut [Arg<'w>]) -> Result<()> + Send + Sync>;

/// In-process executor.
///
/// Runs `Noop` and `Exec`/`ExecWithResource` against a table of host
/// functions keyed by symbol name. Ships two functions:
///
/// * `mytestfunc` writes twice the `i32` found in its first input into its
///   first output.
/// * `mytestfunc_nonser` reads a length-prefixed array of `u32` words and
///   writes the same layout back with every entry doubled.
pub struct Native {
    functions: HashMap<String, HostFn>,
}

impl Native {
    pub const NAME: &'static str = "native";

    pub fn new() -> Self {
        Native {
            functions: HashMap::new(),
        }
        .with_function("mytestfunc", double_i32)
        .with_function("mytestfunc_nonser", double_u32_array)
    }

    pub fn with_function<S, F>(mut self, symbol: S, f: F) -> Self
    where
        S: Into<String>,
        F: for<'x, 'y, 'r, 'w> Fn(&'x [Arg<'r>], &'y mut [Arg<'w>]) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(symbol.into(), Arc::new(f));
        self
    }

    pub fn has_function(&self, symbol: &str) -> bool {
        self.functions.contains_key(symbol)
    }

    fn call(&self, symbol: &str, read: &[Arg<'_>], write: &mut [Arg<'_>]) -> Result<()> {
        let f = self
            .functions
            .get(symbol)
            .ok_or_else(|| Error::unsupported(format!("symbol `{}`", symbol)))?;

        tracing::debug!(symbol, nr_read = read.len(), nr_write = write.len(), "calling host function");
        f(read, write)
    }
}

impl Default for Native {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Native {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut symbols = self.functions.keys().collect::<Vec<_>>();
        symbols.sort();
        f.debug_struct("Native").field("functions", &symbols).finish()
    }
}

fn arg<'b, 'a>(args: &'b [Arg<'a>], idx: usize, what: &str) -> Result<&'b Arg<'a>> {
    args.get(idx)
        .ok_or_else(|| Error::invalid(format!("missing {} argument (slot {})", what, idx)))
}

fn double_i32(read: &[Arg<'_>], write: &mut [Arg<'_>]) -> Result<()> {
    let input = arg(read, 0, "input")?.as_i32()?;
    let out = write
        .first_mut()
        .ok_or_else(|| Error::invalid("missing output argument"))?;
    out.fill(&input.wrapping_mul(2).to_ne_bytes())
}

fn double_u32_array(read: &[Arg<'_>], write: &mut [Arg<'_>]) -> Result<()> {
    let input = arg(read, 0, "input")?.as_bytes();
    if input.len() < 4 || input.len() % 4 != 0 {
        return Err(Error::invalid(format!("{} bytes is not a u32 array", input.len())));
    }

    let mut words = bytemuck::pod_collect_to_vec::<u8, u32>(input);
    let len = words[0] as usize;
    let entries = words
        .get_mut(1..1 + len)
        .ok_or_else(|| Error::invalid(format!("array of {} entries is truncated", len)))?;
    for v in entries {
        *v = v.wrapping_mul(2);
    }

    let out = write
        .first_mut()
        .ok_or_else(|| Error::invalid("missing output argument"))?;
    out.fill(bytemuck::cast_slice(&words))
}

impl Executor for Native {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn session_init(&self, flags: u32) -> Result<u64> {
        let id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, flags, "native session created");
        Ok(id)
    }

    fn session_release(&self, id: u64) -> Result<()> {
        tracing::debug!(id, "native session released");
        Ok(())
    }

    fn genop(&self, session: &Session, read: &[Arg<'_>], write: &mut [Arg<'_>]) -> Result<()> {
        let op = OpType::try_from(arg(read, 0, "op type")?.as_i32()?)?;

        match op {
            OpType::Noop => self.noop(session),
            OpType::Exec => {
                let library = arg(read, 1, "library")?.as_str()?;
                let symbol = arg(read, 2, "symbol")?.as_str()?;
                self.exec(session, Path::new(library), symbol, &read[3..], write)
            }
            OpType::ExecWithResource => {
                let id = arg(read, 1, "resource")?.as_u64()?;
                let symbol = arg(read, 2, "symbol")?.as_str()?;
                let resource = session.resource(id).ok_or(Error::NotRegistered {
                    resource: id,
                    session: session.id(),
                })?;
                self.exec_with_resource(session, resource, symbol, &read[3..], write)
            }
            other => Err(Error::unsupported(format!(
                "op {} by the native executor",
                other.name()
            ))),
        }
    }

    fn noop(&self, session: &Session) -> Result<()> {
        tracing::debug!(session = session.id(), "noop");
        Ok(())
    }

    fn exec(
        &self,
        _session: &Session,
        library: &Path,
        symbol: &str,
        read: &[Arg<'_>],
        write: &mut [Arg<'_>],
    ) -> Result<()> {
        if !library.is_file() {
            return Err(Error::NotFound(PathBuf::from(library)));
        }
        self.call(symbol, read, write)
    }

    fn exec_with_resource(
        &self,
        session: &Session,
        resource: &Resource,
        symbol: &str,
        read: &[Arg<'_>],
        write: &mut [Arg<'_>],
    ) -> Result<()> {
        if resource.kind() != ResourceType::Lib {
            return Err(Error::invalid(format!(
                "resource {} is a {} resource, not a library",
                resource.id(),
                resource.kind()
            )));
        }
        if !session.is_registered(resource) {
            return Err(Error::NotRegistered {
                resource: resource.id(),
                session: session.id(),
            });
        }
        self.call(symbol, read, write)
    }
}
