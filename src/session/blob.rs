use crate::error::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt::{Debug, Display, Formatter};
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlobType {
    /// Read from an existing file.
    File,
    /// Held in memory only.
    Buffer,
    /// Persisted by us into a file we remove on drop.
    Mapped,
}

impl Display for BlobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobType::File => write!(f, "file"),
            BlobType::Buffer => write!(f, "buffer"),
            BlobType::Mapped => write!(f, "mapped"),
        }
    }
}

/// A named chunk of bytes backing a resource.
pub struct Blob {
    kind: BlobType,
    name: String,
    path: Option<PathBuf>,
    data: Vec<u8>,
}

const SUFFIX_LEN: usize = 6;

impl Blob {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::from_io(e, path.to_path_buf()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Blob {
            kind: BlobType::File,
            name,
            path: Some(path.to_path_buf()),
            data,
        })
    }

    /// Builds a blob from a copy of `bytes`.
    ///
    /// Without `dir` the blob lives in memory only. With `dir` the bytes are
    /// also written to `dir/name` (plus a random suffix if `randomize`), and
    /// the file is removed again when the blob is dropped.
    pub fn from_buf(bytes: &[u8], name: &str, dir: Option<&Path>, randomize: bool) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::invalid("blob data is empty"));
        }
        if name.is_empty() {
            return Err(Error::invalid("blob name is empty"));
        }
        if !is_file_name(name) {
            return Err(Error::invalid(format!("blob name `{}` is not a plain file name", name)));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(bytes.len())
            .map_err(|_| Error::OutOfMemory(bytes.len()))?;
        data.extend_from_slice(bytes);

        let dir = match dir {
            Some(dir) => dir,
            None => return Ok(Blob::new(name, data)),
        };

        let name = if randomize {
            let suffix = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(SUFFIX_LEN)
                .map(char::from)
                .collect::<String>();
            format!("{}.{}", name, suffix)
        } else {
            name.to_string()
        };

        fs::create_dir_all(dir).map_err(|e| Error::from_io(e, dir.to_path_buf()))?;
        let path = dir.join(&name);
        fs::write(&path, &data).map_err(|e| Error::from_io(e, path.clone()))?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "persisted blob");

        Ok(Blob {
            kind: BlobType::Mapped,
            name,
            path: Some(path),
            data,
        })
    }

    /// In-memory blob taking ownership of `data`.
    pub fn new<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
        Blob {
            kind: BlobType::Buffer,
            name: name.into(),
            path: None,
            data,
        }
    }

    pub fn kind(&self) -> BlobType {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if self.kind != BlobType::Mapped {
            return;
        }
        if let Some(path) = &self.path {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "could not remove blob file");
            }
        }
    }
}

impl Debug for Blob {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("size", &self.data.len())
            .finish()
    }
}

// a single normal component, so joining it never leaves the target dir
fn is_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) => c == name,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::session::blob::{Blob, BlobType};
    use std::fs;

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pt");
        fs::write(&path, b"weights").unwrap();

        let blob = Blob::from_path(&path).unwrap();
        assert_eq!(blob.kind(), BlobType::File);
        assert_eq!(blob.name(), "model.pt");
        assert_eq!(blob.data(), b"weights");

        // file blobs never delete what they read
        drop(blob);
        assert!(path.exists());

        let missing = Blob::from_path(dir.path().join("nope"));
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_from_buf_memory() {
        let blob = Blob::from_buf(b"abc", "labels.txt", None, false).unwrap();
        assert_eq!(blob.kind(), BlobType::Buffer);
        assert!(blob.path().is_none());
        assert_eq!(blob.size(), 3);

        assert!(matches!(
            Blob::from_buf(b"", "x", None, false),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Blob::from_buf(b"x", "", None, false),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_from_buf_persisted() {
        let dir = tempfile::tempdir().unwrap();

        let blob = Blob::from_buf(b"abc", "lib.so", Some(dir.path()), false).unwrap();
        assert_eq!(blob.kind(), BlobType::Mapped);
        let path = blob.path().unwrap().to_path_buf();
        assert_eq!(path, dir.path().join("lib.so"));
        assert_eq!(fs::read(&path).unwrap(), b"abc");

        drop(blob);
        assert!(!path.exists());
    }

    #[test]
    fn test_randomized_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = Blob::from_buf(b"1", "lib.so", Some(dir.path()), true).unwrap();
        let b = Blob::from_buf(b"2", "lib.so", Some(dir.path()), true).unwrap();

        assert!(a.name().starts_with("lib.so."));
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_from_buf_rejects_paths() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("resource.1");
        let outside = root.path().join("victim");
        fs::write(&outside, b"keep").unwrap();

        for name in ["../victim", "sub/lib.so", "/tmp/lib.so", "..", ".", "lib.so/"] {
            assert!(
                matches!(
                    Blob::from_buf(b"x", name, Some(dir.as_path()), false),
                    Err(Error::InvalidArgument(_))
                ),
                "{}",
                name
            );
        }
        assert_eq!(fs::read(&outside).unwrap(), b"keep");
    }
}
