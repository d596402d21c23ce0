use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::blob::Blob;
use itertools::Itertools;
use std::fmt::{Debug, Display, Formatter};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

// process-wide, shared by every session
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ResourceType {
    Lib,
    Data,
    Model,
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Lib => write!(f, "lib"),
            ResourceType::Data => write!(f, "data"),
            ResourceType::Model => write!(f, "model"),
        }
    }
}

struct Inner {
    id: u64,
    kind: ResourceType,
    refcount: AtomicUsize,
    // None once released
    blobs: RwLock<Option<Vec<Blob>>>,
    paths: Vec<PathBuf>,
    // per-resource directory holding persisted blobs
    dir: Option<PathBuf>,
}

impl Inner {
    fn remove_dir(&self) {
        if let Some(dir) = &self.dir {
            if let Err(e) = fs::remove_dir(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "could not remove resource directory");
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let blobs = self
            .blobs
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        // blobs remove their files first, then the directory goes
        if blobs.is_some() {
            drop(blobs);
            self.remove_dir();
        }
    }
}

/// Something a session operates on: a code library, a data set or a model.
///
/// Cloning is cheap and yields a handle to the same resource. The resource
/// counts the sessions it is registered with and refuses to be released
/// while that count is not zero.
#[derive(Clone)]
pub struct Resource {
    inner: Arc<Inner>,
}

fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

fn download(url: &str) -> Result<Blob> {
    tracing::debug!(url, "downloading resource");

    let response = ureq::get(url)
        .call()
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let mut data = Vec::new();
    response.into_reader().read_to_end(&mut data)?;

    if data.is_empty() {
        return Err(Error::invalid(format!("{} returned no data", url)));
    }

    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("download");
    Ok(Blob::new(name, data))
}

fn dir_blobs(dir: &Path) -> Result<Vec<Blob>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::from_io(e, dir.to_path_buf()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(Error::invalid(format!("{} contains no files", dir.display())));
    }

    files.into_iter().sorted().map(Blob::from_path).collect()
}

impl Resource {
    fn build(kind: ResourceType, blobs: Vec<Blob>, paths: Vec<PathBuf>, dir: Option<PathBuf>, id: u64) -> Self {
        tracing::debug!(id, %kind, blobs = blobs.len(), "resource created");

        Resource {
            inner: Arc::new(Inner {
                id,
                kind,
                refcount: AtomicUsize::new(0),
                blobs: RwLock::new(Some(blobs)),
                paths,
                dir,
            }),
        }
    }

    fn next_id() -> u64 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates a resource from a file, a directory of files or an
    /// `http(s)://` URL.
    pub fn new<S: AsRef<str>>(path: S, kind: ResourceType) -> Result<Self> {
        let path = path.as_ref();
        if path.is_empty() {
            return Err(Error::invalid("empty resource path"));
        }

        if is_url(path) {
            let blob = download(path)?;
            return Ok(Self::build(kind, vec![blob], vec![PathBuf::from(path)], None, Self::next_id()));
        }

        let p = Path::new(path);
        let meta = fs::metadata(p).map_err(|e| Error::from_io(e, p.to_path_buf()))?;
        let blobs = if meta.is_dir() {
            dir_blobs(p)?
        } else {
            vec![Blob::from_path(p)?]
        };

        Ok(Self::build(kind, blobs, vec![p.to_path_buf()], None, Self::next_id()))
    }

    /// Creates one resource backed by several files.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P], kind: ResourceType) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::invalid("no paths given"));
        }

        let blobs = paths
            .iter()
            .map(|p| Blob::from_path(p))
            .collect::<Result<Vec<_>>>()?;
        let paths = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();

        Ok(Self::build(kind, blobs, paths, None, Self::next_id()))
    }

    /// Creates a resource from a copy of `bytes`.
    ///
    /// Unless `mem_only` is set the bytes are persisted under the configured
    /// root directory, in a directory private to this resource.
    pub fn from_buf(bytes: &[u8], kind: ResourceType, name: &str, mem_only: bool) -> Result<Self> {
        let rootdir = Config::from_env().rootdir;
        Self::from_buf_in(bytes, kind, name, (!mem_only).then_some(rootdir.as_path()))
    }

    /// Like [`Resource::from_buf`] with an explicit root directory; `None`
    /// keeps the bytes in memory.
    pub fn from_buf_in(bytes: &[u8], kind: ResourceType, name: &str, rootdir: Option<&Path>) -> Result<Self> {
        let id = Self::next_id();
        let dir = rootdir.map(|root| root.join(format!("resource.{}", id)));

        let blob = match Blob::from_buf(bytes, name, dir.as_deref(), false) {
            Ok(blob) => blob,
            Err(e) => {
                if let Some(dir) = &dir {
                    let _ = fs::remove_dir(dir);
                }
                return Err(e);
            }
        };

        let paths = blob.path().map(Path::to_path_buf).into_iter().collect();
        Ok(Self::build(kind, vec![blob], paths, dir, id))
    }

    pub fn from_blobs(blobs: Vec<Blob>, kind: ResourceType) -> Result<Self> {
        if blobs.is_empty() {
            return Err(Error::invalid("no blobs given"));
        }

        let paths = blobs
            .iter()
            .filter_map(|b| b.path().map(Path::to_path_buf))
            .collect();
        Ok(Self::build(kind, blobs, paths, None, Self::next_id()))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> ResourceType {
        self.inner.kind
    }

    /// Number of sessions this resource is registered with.
    pub fn refcount(&self) -> usize {
        self.inner.refcount.load(Ordering::Acquire)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.inner.paths
    }

    /// Runs `f` over the blobs backing this resource.
    pub fn with_blobs<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&[Blob]) -> R,
    {
        let blobs = self.inner.blobs.read().unwrap_or_else(PoisonError::into_inner);
        match blobs.as_deref() {
            Some(blobs) => Ok(f(blobs)),
            None => Err(self.released_error()),
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn released_error(&self) -> Error {
        Error::invalid(format!("resource {} has been released", self.id()))
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(self.released_error());
        }
        Ok(())
    }

    pub(crate) fn ensure_kind(&self, kind: ResourceType) -> Result<()> {
        if self.kind() != kind {
            return Err(Error::invalid(format!(
                "resource {} is a {} resource, expected {}",
                self.id(),
                self.kind(),
                kind
            )));
        }
        Ok(())
    }

    pub(crate) fn acquire(&self) -> usize {
        self.inner.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn put(&self) -> Result<usize> {
        self.inner
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|prev| prev - 1)
            .map_err(|_| Error::invalid(format!("resource {} is not referenced", self.id())))
    }

    /// Frees the backing storage. Fails with [`Error::Busy`] while any
    /// session still holds the resource.
    pub fn release(&self) -> Result<()> {
        let refs = self.refcount();
        if refs > 0 {
            return Err(Error::Busy {
                what: format!("resource {}", self.id()),
                refs,
            });
        }

        let blobs = self
            .inner
            .blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| self.released_error())?;

        drop(blobs);
        self.inner.remove_dir();
        tracing::debug!(id = self.id(), "resource released");
        Ok(())
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Resource {}

impl Debug for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("refcount", &self.refcount())
            .field("paths", &self.paths())
            .field("released", &self.is_released())
            .finish()
    }
}
