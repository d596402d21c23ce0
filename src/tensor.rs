pub mod data;
pub mod format;

use crate::backend::{ExecutorTensor, TensorView};
use crate::error::{code, Error, Result};
use crate::tensor::data::{DataType, Storage};
use bytemuck::Pod;
use itertools::Itertools;
use num_traits::ToPrimitive;
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};

pub type Dims<D> = SmallVec<[<D as DataType>::Dim; 5]>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TensorState {
    /// dims and type set, no storage
    Described,
    /// owns its storage
    Allocated,
    /// references caller storage
    Borrowed,
    /// storage was handed out through `take_data`
    Taken,
    Released,
}

/// Typed buffer descriptor shared by every operation family.
///
/// A tensor either owns its bytes (freed when released or dropped) or
/// borrows them for `'a`. Ownership moves out through [`Tensor::take_data`],
/// which leaves the cell empty so the bytes can never be freed twice.
pub struct Tensor<'a, D: DataType> {
    dims: Dims<D>,
    data_type: D,
    data: Option<Storage<'a>>,
    state: TensorState,
}

impl<'a, D: DataType> Tensor<'a, D> {
    pub fn new(dims: &[D::Dim], data_type: D) -> Result<Self> {
        if dims.is_empty() {
            return Err(Error::invalid(format!(
                "{} tensor needs at least one dimension",
                D::FAMILY
            )));
        }

        Ok(Tensor {
            dims: dims.iter().copied().collect(),
            data_type,
            data: None,
            state: TensorState::Described,
        })
    }

    /// Describes a tensor and allocates `size` zeroed bytes for it.
    ///
    /// A zero `size` leaves the tensor described but without storage.
    pub fn allocate(dims: &[D::Dim], data_type: D, size: usize) -> Result<Self> {
        let mut tensor = Self::new(dims, data_type)?;
        if size == 0 {
            return Ok(tensor);
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory(size))?;
        buf.resize(size, 0);

        tensor.data = Some(Storage::Owned(buf));
        tensor.state = TensorState::Allocated;
        Ok(tensor)
    }

    /// Tensor referencing caller-owned bytes.
    pub fn with_data(dims: &[D::Dim], data_type: D, data: &'a [u8]) -> Result<Self> {
        let mut tensor = Self::new(dims, data_type)?;
        tensor.set_data(data)?;
        Ok(tensor)
    }

    /// Tensor owning a copy of `values`.
    pub fn from_slice<T: Pod>(dims: &[D::Dim], data_type: D, values: &[T]) -> Result<Self> {
        if let Some(bytes) = data_type.bytes() {
            if bytes != std::mem::size_of::<T>() {
                return Err(Error::invalid(format!(
                    "{} elements are {} bytes, got {} byte values",
                    data_type,
                    bytes,
                    std::mem::size_of::<T>()
                )));
            }
        }

        let mut tensor = Self::new(dims, data_type)?;
        tensor.set_data(bytemuck::cast_slice::<T, u8>(values).to_vec())?;
        Ok(tensor)
    }

    /// Assigns new storage to the tensor.
    ///
    /// Owned storage moves the tensor to `Allocated`, borrowed storage to
    /// `Borrowed`. Storage the tensor already owned is dropped with a
    /// warning.
    pub fn set_data<S>(&mut self, data: S) -> Result<()>
    where
        S: Into<Storage<'a>>,
    {
        if self.state == TensorState::Released {
            return Err(Error::invalid("tensor has been released"));
        }

        let data = data.into();
        let state = if data.is_owned() {
            TensorState::Allocated
        } else {
            TensorState::Borrowed
        };

        if let Some(prev) = self.data.replace(data) {
            if prev.is_owned() {
                tracing::warn!(
                    family = D::FAMILY,
                    bytes = prev.len(),
                    "previous tensor data is replaced while still owned"
                );
            }
        }

        self.state = state;
        Ok(())
    }

    /// Moves the storage out of the tensor, leaving it without data.
    pub fn take_data(&mut self) -> Option<Storage<'a>> {
        let data = self.data.take()?;
        self.state = TensorState::Taken;
        Some(data)
    }

    /// Frees owned storage. Borrowed storage is only forgotten.
    pub fn release(&mut self) {
        if self.state == TensorState::Released {
            return;
        }

        if let Some(data) = self.data.take() {
            if data.is_owned() {
                tracing::trace!(family = D::FAMILY, bytes = data.len(), "freeing tensor data");
            }
        }
        self.state = TensorState::Released;
    }

    pub fn dims(&self) -> &[D::Dim] {
        &self.dims
    }

    pub fn nr_dims(&self) -> usize {
        self.dims.len()
    }

    pub fn data_type(&self) -> D {
        self.data_type
    }

    pub fn state(&self) -> TensorState {
        self.state
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_ref().map(|d| d.as_slice())
    }

    pub fn size(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    pub fn is_owned(&self) -> bool {
        self.data.as_ref().map_or(false, |d| d.is_owned())
    }

    /// Number of elements, `None` if a dimension is negative or the
    /// product overflows.
    pub fn numel(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.to_usize()?))
    }

    pub fn to_vec<T: Pod>(&self) -> Result<Vec<T>> {
        let data = self
            .data()
            .ok_or_else(|| Error::invalid("tensor holds no data"))?;

        if data.len() % std::mem::size_of::<T>() != 0 {
            return Err(Error::invalid(format!(
                "{} bytes cannot be viewed as {} byte elements",
                data.len(),
                std::mem::size_of::<T>()
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(data))
    }

    /// Borrowed view handed to executors.
    pub fn view(&self) -> TensorView<'_, D::Dim> {
        TensorView {
            dims: &self.dims,
            data_type: self.data_type.code(),
            data: self.data().unwrap_or(&[]),
        }
    }
}

impl<D: DataType> Debug for Tensor<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Tensor([{}], {}, {:?}, {} bytes)",
            D::FAMILY,
            self.dims.iter().join(", "),
            self.data_type,
            self.state,
            self.size()
        )
    }
}

/// Moves executor-produced tensors into the caller's output slots.
///
/// For every produced tensor: read back dims and type, build a fresh cell,
/// take the executor's buffer, hand it to the cell as owned storage and
/// delete the executor descriptor. Decoding stops at the first failure;
/// slots decoded before it keep their (owned) tensors.
pub(crate) fn decode_outputs<D: DataType>(
    produced: Vec<Option<ExecutorTensor<D::Dim>>>,
    outputs: &mut [Option<Tensor<'static, D>>],
) -> Result<()> {
    if produced.len() != outputs.len() {
        tracing::error!(
            declared = outputs.len(),
            produced = produced.len(),
            "executor returned a different number of outputs"
        );
        return Err(Error::Backend {
            code: code::EPROTO,
            message: format!(
                "{} outputs declared but executor produced {}",
                outputs.len(),
                produced.len()
            ),
        });
    }

    for (idx, (slot, out)) in produced.into_iter().zip(outputs.iter_mut()).enumerate() {
        let Some(mut raw) = slot else {
            continue;
        };

        let data_type = D::from_code(raw.data_type()).ok_or_else(|| {
            tracing::error!(idx, code = raw.data_type(), "unknown output data type");
            Error::unsupported(format!(
                "{} data type {} of output {}",
                D::FAMILY,
                raw.data_type(),
                idx
            ))
        })?;

        let mut tensor = Tensor::new(raw.dims(), data_type).map_err(|e| {
            tracing::error!(idx, "could not initialize output tensor from executor dims and type");
            e
        })?;

        let data = raw.take_data().map_err(|e| {
            tracing::error!(idx, "could not take data from executor tensor");
            e
        })?;

        tensor.set_data(data)?;
        raw.delete();

        *out = Some(tensor);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::backend::ExecutorTensor;
    use crate::error::Error;
    use crate::tensor::data::{data_type_enum, Storage};
    use crate::tensor::{decode_outputs, Tensor, TensorState};

    data_type_enum! {
        Elem, dim = i64, family = "test", float32 = Float, {
            Float = 1, Some(4), "float";
            Int = 2, Some(4), "int";
        }
    }

    #[test]
    fn test_init_release() {
        let mut t = Tensor::<Elem>::new(&[1, 2, 3], Elem::Float).unwrap();
        assert_eq!(t.state(), TensorState::Described);
        assert_eq!(t.size(), 0);
        assert!(!t.is_owned());

        t.release();
        assert_eq!(t.state(), TensorState::Released);
        t.release();
        assert_eq!(t.state(), TensorState::Released);
    }

    #[test]
    fn test_empty_dims() {
        let r = Tensor::<Elem>::new(&[], Elem::Float);
        assert!(matches!(r, Err(Error::InvalidArgument(_))));

        let r = Tensor::<Elem>::allocate(&[], Elem::Float, 16);
        assert!(matches!(r, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_allocate() {
        let t = Tensor::<Elem>::allocate(&[2, 2], Elem::Int, 16).unwrap();
        assert_eq!(t.state(), TensorState::Allocated);
        assert!(t.is_owned());
        assert_eq!(t.size(), 16);
        assert_eq!(t.numel(), Some(4));

        let t = Tensor::<Elem>::allocate(&[2, 2], Elem::Int, 0).unwrap();
        assert_eq!(t.state(), TensorState::Described);
    }

    #[test]
    fn test_numel_overflow() {
        let t = Tensor::<Elem>::new(&[1 << 40, 1 << 40], Elem::Float).unwrap();
        assert_eq!(t.numel(), None);

        let t = Tensor::<Elem>::new(&[2, -1], Elem::Float).unwrap();
        assert_eq!(t.numel(), None);
    }

    #[test]
    fn test_take_moves_ownership() {
        let payload = vec![7u8; 12];
        let ptr = payload.as_ptr();

        let mut t = Tensor::<Elem>::new(&[3], Elem::Float).unwrap();
        t.set_data(payload).unwrap();
        assert!(t.is_owned());

        let taken = t.take_data().unwrap();
        assert!(taken.is_owned());
        assert_eq!(taken.as_ptr(), ptr);
        assert_eq!(taken.len(), 12);

        assert_eq!(t.state(), TensorState::Taken);
        assert!(!t.is_owned());
        assert_eq!(t.size(), 0);
        assert!(t.take_data().is_none());

        t.release();
        assert_eq!(taken.as_slice(), &[7u8; 12][..]);
    }

    #[test]
    fn test_borrowed() {
        let bytes = [0u8, 0, 128, 63];
        let mut t = Tensor::<Elem>::with_data(&[1], Elem::Float, &bytes).unwrap();
        assert_eq!(t.state(), TensorState::Borrowed);
        assert!(!t.is_owned());
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0]);

        t.release();
        assert_eq!(t.data(), None);
        assert_eq!(bytes, [0u8, 0, 128, 63]);
    }

    #[test]
    fn test_set_data_replaces_owned() {
        let mut t = Tensor::<Elem>::allocate(&[1], Elem::Int, 4).unwrap();
        t.set_data(vec![1u8, 0, 0, 0]).unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![1]);

        t.release();
        assert!(t.set_data(vec![0u8; 4]).is_err());
    }

    #[test]
    fn test_from_slice() {
        let t = Tensor::<Elem>::from_slice(&[2], Elem::Float, &[1.5f32, -2.0]).unwrap();
        assert_eq!(t.size(), 8);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.5, -2.0]);

        let r = Tensor::<Elem>::from_slice(&[2], Elem::Float, &[1.0f64, 2.0]);
        assert!(r.is_err());
    }

    #[test]
    fn test_decode_outputs() {
        let produced = vec![
            Some(ExecutorTensor::new(vec![2i64], 2, vec![1, 0, 0, 0, 2, 0, 0, 0])),
            None,
        ];
        let mut outputs: Vec<Option<Tensor<Elem>>> = vec![None, None];

        decode_outputs(produced, &mut outputs).unwrap();

        let first = outputs[0].as_ref().unwrap();
        assert_eq!(first.dims(), &[2]);
        assert_eq!(first.data_type(), Elem::Int);
        assert!(first.is_owned());
        assert_eq!(first.to_vec::<i32>().unwrap(), vec![1, 2]);
        assert!(outputs[1].is_none());
    }

    #[test]
    fn test_decode_outputs_partial_failure() {
        let produced = vec![
            Some(ExecutorTensor::new(vec![1i64], 1, vec![0u8; 4])),
            Some(ExecutorTensor::new(vec![1i64], 99, vec![0u8; 4])),
        ];
        let mut outputs: Vec<Option<Tensor<Elem>>> = vec![None, None];

        let r = decode_outputs(produced, &mut outputs);
        assert!(matches!(r, Err(Error::Unsupported(_))));

        let first = outputs[0].as_mut().unwrap();
        assert!(first.is_owned());
        first.release();
        assert!(outputs[1].is_none());
    }

    #[test]
    fn test_decode_outputs_count_mismatch() {
        let produced = vec![Some(ExecutorTensor::new(vec![1i64], 1, vec![0u8; 4]))];
        let mut outputs: Vec<Option<Tensor<Elem>>> = vec![None, None];

        assert!(decode_outputs(produced, &mut outputs).is_err());
        assert!(outputs.iter().all(Option::is_none));
    }

    #[test]
    fn test_storage_kinds() {
        let bytes = [1u8];
        assert!(!Storage::from(&bytes[..]).is_owned());
    }
}
