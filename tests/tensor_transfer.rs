use std::sync::Arc;
use vaccel::backend::{Executor, ExecutorTensor, TensorView};
use vaccel::ops::torch::{model_run, TorchDataType, TorchTensor};
use vaccel::{Blob, DataType, Error, Resource, ResourceType, Session, TensorState};

// the first output is well formed, the second carries an unknown type
struct HalfBroken;

impl Executor for HalfBroken {
    fn name(&self) -> &str {
        "half-broken"
    }

    fn session_init(&self, _flags: u32) -> vaccel::Result<u64> {
        Ok(11)
    }

    fn session_release(&self, _id: u64) -> vaccel::Result<()> {
        Ok(())
    }

    fn torch_model_run(
        &self,
        _session: &Session,
        _model: &Resource,
        _options: Option<&[u8]>,
        _inputs: &[TensorView<'_, i64>],
        nr_outputs: usize,
    ) -> vaccel::Result<Vec<Option<ExecutorTensor<i64>>>> {
        assert_eq!(nr_outputs, 2);
        Ok(vec![
            Some(ExecutorTensor::new(
                vec![2],
                TorchDataType::Float.code(),
                bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0]).to_vec(),
            )),
            Some(ExecutorTensor::new(vec![1], 99, vec![0; 4])),
        ])
    }
}

// produces fewer outputs than were declared
struct Short;

impl Executor for Short {
    fn name(&self) -> &str {
        "short"
    }

    fn session_init(&self, _flags: u32) -> vaccel::Result<u64> {
        Ok(12)
    }

    fn session_release(&self, _id: u64) -> vaccel::Result<()> {
        Ok(())
    }

    fn torch_model_run(
        &self,
        _session: &Session,
        _model: &Resource,
        _options: Option<&[u8]>,
        _inputs: &[TensorView<'_, i64>],
        _nr_outputs: usize,
    ) -> vaccel::Result<Vec<Option<ExecutorTensor<i64>>>> {
        Ok(vec![Some(ExecutorTensor::new(vec![1], TorchDataType::Byte.code(), vec![1]))])
    }
}

fn setup(executor: Arc<dyn Executor>) -> (Session, Resource) {
    let mut sess = Session::with_executor(executor, 0).unwrap();
    let model = Resource::from_blobs(vec![Blob::new("model.pt", vec![0])], ResourceType::Model).unwrap();
    sess.register(&model).unwrap();
    (sess, model)
}

#[test]
fn failure_on_second_output_keeps_the_first() {
    let (sess, model) = setup(Arc::new(HalfBroken));
    let input = TorchTensor::from_slice(&[1], TorchDataType::Float, &[0.0f32]).unwrap();
    let mut outputs: [Option<TorchTensor<'static>>; 2] = [None, None];

    let e = model_run(&sess, &model, None, &[input], &mut outputs).unwrap_err();
    assert!(matches!(e, Error::Unsupported(_)));

    let first = outputs[0].as_mut().unwrap();
    assert!(first.is_owned());
    assert_eq!(first.to_vec::<f32>().unwrap(), vec![1.0, 2.0]);
    first.release();
    assert_eq!(first.state(), TensorState::Released);
    assert!(outputs[1].is_none());
}

#[test]
fn output_count_mismatch_is_an_error() {
    let (sess, model) = setup(Arc::new(Short));
    let mut outputs: [Option<TorchTensor<'static>>; 2] = [None, None];

    let e = model_run(&sess, &model, None, &[], &mut outputs).unwrap_err();
    assert!(matches!(e, Error::Backend { .. }));
    assert!(outputs.iter().all(Option::is_none));
}

#[test]
fn take_hands_over_the_same_allocation() {
    let mut t = TorchTensor::new(&[2, 2], TorchDataType::Int).unwrap();
    assert_eq!(t.state(), TensorState::Described);

    let bytes = vec![7u8; 16];
    let ptr = bytes.as_ptr();
    t.set_data(bytes).unwrap();
    assert!(t.is_owned());

    let taken = t.take_data().unwrap();
    assert_eq!(taken.as_ptr(), ptr);
    assert_eq!(taken.len(), 16);
    assert_eq!(t.size(), 0);
    assert!(!t.is_owned());

    t.release();
    t.release();
    assert_eq!(t.state(), TensorState::Released);
    assert_eq!(taken.into_owned(), vec![7u8; 16]);
}

#[test]
fn borrowed_data_is_left_to_the_caller() {
    let data = [1u8, 2, 3, 4];
    let mut t = TorchTensor::with_data(&[4], TorchDataType::Byte, &data).unwrap();
    assert_eq!(t.state(), TensorState::Borrowed);
    assert!(!t.is_owned());
    assert_eq!(t.data_type().bytes(), Some(1));

    t.release();
    assert_eq!(data, [1, 2, 3, 4]);
}
