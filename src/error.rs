use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

// errno-style status codes used by executors
pub mod code {
    pub const OK: i32 = 0;
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const ERANGE: i32 = 34;
    pub const EPROTO: i32 = 71;
    pub const ENOTSUP: i32 = 95;
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {}", .0)]
    InvalidArgument(String),

    #[error("out of memory (requested {} bytes)", .0)]
    OutOfMemory(usize),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{} is still referenced ({} references)", .what, .refs)]
    Busy { what: String, refs: usize },

    #[error("resource {} is not registered with session {}", .resource, .session)]
    NotRegistered { resource: u64, session: u64 },

    #[error("resource {} is already registered with session {}", .resource, .session)]
    AlreadyRegistered { resource: u64, session: u64 },

    #[error("slot {} is out of range (capacity {})", .index, .capacity)]
    OutOfRange { index: usize, capacity: usize },

    #[error("backend error {}: {}", .code, .message)]
    Backend { code: i32, message: String },

    #[error("unsupported: {}", .0)]
    Unsupported(String),

    #[error("i/o error")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Status code of this error in the executor's errno convention.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => code::EINVAL,
            Error::OutOfMemory(_) => code::ENOMEM,
            Error::NotFound(_) => code::ENOENT,
            Error::Busy { .. } => code::EBUSY,
            Error::NotRegistered { .. } => code::ENOENT,
            Error::AlreadyRegistered { .. } => code::EEXIST,
            Error::OutOfRange { .. } => code::ERANGE,
            Error::Backend { code, .. } => *code,
            Error::Unsupported(_) => code::ENOTSUP,
            Error::Io(e) => e.raw_os_error().unwrap_or(code::EIO),
        }
    }

    /// Maps a status code reported by an executor back into an error.
    ///
    /// Returns `None` for `OK`. Codes without a dedicated kind are passed
    /// through as [`Error::Backend`].
    pub fn from_code<S: Into<String>>(status: i32, message: S) -> Option<Self> {
        let message = message.into();
        let err = match status {
            code::OK => return None,
            code::EINVAL => Error::InvalidArgument(message),
            code::ENOMEM => Error::OutOfMemory(0),
            code::ENOENT => Error::NotFound(PathBuf::from(message)),
            code::EBUSY => Error::Busy {
                what: message,
                refs: 0,
            },
            code::ENOTSUP => Error::Unsupported(message),
            other => Error::Backend {
                code: other,
                message,
            },
        };
        Some(err)
    }

    pub(crate) fn from_io(e: io::Error, path: PathBuf) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            Error::NotFound(path)
        } else {
            Error::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{code, Error};

    #[test]
    fn test_code_mapping() {
        assert!(Error::from_code(code::OK, "").is_none());

        let e = Error::from_code(code::EINVAL, "bad handle").unwrap();
        assert!(matches!(e, Error::InvalidArgument(_)));
        assert_eq!(e.code(), code::EINVAL);

        let e = Error::from_code(code::ENOTSUP, "op").unwrap();
        assert_eq!(e.code(), code::ENOTSUP);

        // unknown codes are passed through opaquely
        let e = Error::from_code(1234, "plugin failure").unwrap();
        assert!(matches!(e, Error::Backend { code: 1234, .. }));
        assert_eq!(e.code(), 1234);
    }

    #[test]
    fn test_io_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = Error::from_io(io, "/no/such/file".into());
        assert!(matches!(e, Error::NotFound(_)));
        assert_eq!(e.code(), code::ENOENT);
    }
}
