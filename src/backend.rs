pub mod native;

use crate::args::Arg;
use crate::error::{code, Error, Result};
use crate::ops::tf::{TfNode, TfStatus};
use crate::session::resource::Resource;
use crate::session::Session;
use std::path::Path;

fn unsupported<T>(executor: &str, op: &str) -> Result<T> {
    Err(Error::unsupported(format!("{} is not implemented by the {} executor", op, executor)))
}

/// Tensors returned by a typed run, paired with the run's status byte.
pub type TfLiteOutputs = (Vec<Option<ExecutorTensor<i32>>>, u8);

/// Tensors returned by a TensorFlow run, paired with the run's status.
pub type TfOutputs = (Vec<Option<ExecutorTensor<i64>>>, TfStatus);

/// The backend that actually runs operations.
///
/// Every operation has a default implementation returning
/// [`Error::Unsupported`]; a backend overrides what it can run. Calls block
/// until the backend is done.
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    /// Allocates a backend session and returns its id.
    fn session_init(&self, flags: u32) -> Result<u64>;

    fn session_release(&self, id: u64) -> Result<()>;

    fn register_resource(&self, _session: &Session, _resource: &Resource) -> Result<()> {
        Ok(())
    }

    fn unregister_resource(&self, _session: &Session, _resource: &Resource) -> Result<()> {
        Ok(())
    }

    /// Runs the operation encoded in `read` (op type first), filling every
    /// slot of `write` in declaration order.
    fn genop(&self, _session: &Session, _read: &[Arg<'_>], _write: &mut [Arg<'_>]) -> Result<()> {
        unsupported(self.name(), "genop")
    }

    fn noop(&self, _session: &Session) -> Result<()> {
        unsupported(self.name(), "noop")
    }

    fn exec(
        &self,
        _session: &Session,
        _library: &Path,
        _symbol: &str,
        _read: &[Arg<'_>],
        _write: &mut [Arg<'_>],
    ) -> Result<()> {
        unsupported(self.name(), "exec")
    }

    fn exec_with_resource(
        &self,
        _session: &Session,
        _resource: &Resource,
        _symbol: &str,
        _read: &[Arg<'_>],
        _write: &mut [Arg<'_>],
    ) -> Result<()> {
        unsupported(self.name(), "exec with resource")
    }

    /// Classifies an image, writing NUL-terminated text into the two
    /// fixed-size output buffers.
    fn image_classify(
        &self,
        _session: &Session,
        _image: &[u8],
        _out_text: &mut [u8],
        _out_image_name: &mut [u8],
    ) -> Result<()> {
        unsupported(self.name(), "image classification")
    }

    fn torch_model_load(&self, _session: &Session, _model: &Resource) -> Result<()> {
        unsupported(self.name(), "torch model load")
    }

    fn torch_model_run(
        &self,
        _session: &Session,
        _model: &Resource,
        _options: Option<&[u8]>,
        _inputs: &[TensorView<'_, i64>],
        _nr_outputs: usize,
    ) -> Result<Vec<Option<ExecutorTensor<i64>>>> {
        unsupported(self.name(), "torch model run")
    }

    fn tf_model_load(&self, _session: &Session, _model: &Resource) -> Result<TfStatus> {
        unsupported(self.name(), "tensorflow model load")
    }

    fn tf_model_run(
        &self,
        _session: &Session,
        _model: &Resource,
        _options: Option<&[u8]>,
        _in_nodes: &[TfNode],
        _inputs: &[TensorView<'_, i64>],
        _out_nodes: &[TfNode],
    ) -> Result<TfOutputs> {
        unsupported(self.name(), "tensorflow model run")
    }

    fn tf_model_unload(&self, _session: &Session, _model: &Resource) -> Result<TfStatus> {
        unsupported(self.name(), "tensorflow model unload")
    }

    fn tflite_session_load(&self, _session: &Session, _model: &Resource) -> Result<()> {
        unsupported(self.name(), "tflite session load")
    }

    fn tflite_session_run(
        &self,
        _session: &Session,
        _model: &Resource,
        _inputs: &[TensorView<'_, i32>],
        _nr_outputs: usize,
    ) -> Result<TfLiteOutputs> {
        unsupported(self.name(), "tflite session run")
    }

    fn tflite_session_delete(&self, _session: &Session, _model: &Resource) -> Result<()> {
        unsupported(self.name(), "tflite session delete")
    }
}

/// Borrowed tensor handed to an executor as input.
#[derive(Clone, Copy, Debug)]
pub struct TensorView<'a, Dim> {
    pub dims: &'a [Dim],
    pub data_type: u32,
    pub data: &'a [u8],
}

/// Tensor allocated by an executor as the result of a typed run.
///
/// Its buffer has to be moved out with [`ExecutorTensor::take_data`] before
/// the descriptor is deleted.
#[derive(Debug)]
pub struct ExecutorTensor<Dim> {
    dims: Vec<Dim>,
    data_type: u32,
    data: Option<Vec<u8>>,
    owned: bool,
}

impl<Dim> ExecutorTensor<Dim> {
    pub fn new(dims: Vec<Dim>, data_type: u32, data: Vec<u8>) -> Self {
        ExecutorTensor {
            dims,
            data_type,
            data: Some(data),
            owned: true,
        }
    }

    /// Descriptor whose bytes stay with the executor and cannot be taken.
    pub fn unowned(dims: Vec<Dim>, data_type: u32) -> Self {
        ExecutorTensor {
            dims,
            data_type,
            data: None,
            owned: false,
        }
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn data_type(&self) -> u32 {
        self.data_type
    }

    pub fn size(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn take_data(&mut self) -> Result<Vec<u8>> {
        if !self.owned {
            return Err(Error::Backend {
                code: code::EPERM,
                message: "executor tensor does not own its data".to_string(),
            });
        }

        self.owned = false;
        Ok(self.data.take().unwrap_or_default())
    }

    pub fn delete(self) {
        if self.owned {
            tracing::debug!(bytes = self.size(), "deleting executor tensor that still owns data");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::ExecutorTensor;
    use crate::error::Error;

    #[test]
    fn test_take_data() {
        let mut t = ExecutorTensor::new(vec![2i64], 7, vec![1, 2, 3, 4]);
        assert!(t.is_owned());
        assert_eq!(t.take_data().unwrap(), vec![1, 2, 3, 4]);
        assert!(!t.is_owned());
        assert_eq!(t.size(), 0);

        // a second take finds nothing to hand over
        assert!(matches!(t.take_data(), Err(Error::Backend { .. })));
        t.delete();
    }

    #[test]
    fn test_unowned() {
        let mut t = ExecutorTensor::<i32>::unowned(vec![1], 1);
        assert!(t.take_data().is_err());
    }
}
