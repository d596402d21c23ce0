pub mod args;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod ops;
pub mod session;
pub mod tensor;

pub use args::{Arg, ArgCodec, ArgKind, ArgList};
pub use backend::native::Native;
pub use backend::Executor;
pub use config::Config;
pub use error::{Error, Result};
pub use ops::{genop, noop, OpType};
pub use session::blob::{Blob, BlobType};
pub use session::resource::{Resource, ResourceType};
pub use session::Session;
pub use tensor::data::{DataType, Storage};
pub use tensor::{Tensor, TensorState};
