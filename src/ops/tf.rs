use crate::error::{Error, Result};
use crate::session::resource::{Resource, ResourceType};
use crate::session::Session;
use crate::tensor::data::data_type_enum;
use crate::tensor::{decode_outputs, Tensor};
use std::fmt::{Display, Formatter};

data_type_enum! {
    /// Element types of TensorFlow tensors.
    TfDataType, dim = i64, family = "tf", float32 = Float, {
        Float = 1, Some(4), "float";
        Double = 2, Some(8), "double";
        Int32 = 3, Some(4), "int32";
        Uint8 = 4, Some(1), "uint8";
        Int16 = 5, Some(2), "int16";
        Int8 = 6, Some(1), "int8";
        String = 7, None, "string";
        Complex64 = 8, Some(8), "complex64";
        Int64 = 9, Some(8), "int64";
        Bool = 10, Some(1), "bool";
        Qint8 = 11, Some(1), "qint8";
        Quint8 = 12, Some(1), "quint8";
        Qint32 = 13, Some(4), "qint32";
        Bfloat16 = 14, Some(2), "bfloat16";
        Qint16 = 15, Some(2), "qint16";
        Quint16 = 16, Some(2), "quint16";
        Uint16 = 17, Some(2), "uint16";
        Complex128 = 18, Some(16), "complex128";
        Half = 19, Some(2), "half";
        Resource = 20, None, "resource";
        Variant = 21, None, "variant";
        Uint32 = 22, Some(4), "uint32";
        Uint64 = 23, Some(8), "uint64";
    }
}

impl TfDataType {
    /// Alias of [`TfDataType::Complex64`].
    pub const COMPLEX: TfDataType = TfDataType::Complex64;
}

pub type TfTensor<'a> = Tensor<'a, TfDataType>;

/// Serialized run options.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TfBuffer {
    data: Option<Vec<u8>>,
}

impl TfBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        TfBuffer { data: Some(data) }
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn size(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn take_data(&mut self) -> Option<Vec<u8>> {
        self.data.take()
    }

    pub fn release(&mut self) {
        self.data = None;
    }
}

/// A graph node, addressed by operation name and output index.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TfNode {
    pub name: String,
    pub id: i32,
}

impl TfNode {
    pub fn new<S: Into<String>>(name: S, id: i32) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid("node name is empty"));
        }
        Ok(TfNode { name, id })
    }
}

impl Display for TfNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.id)
    }
}

/// Status reported by the TensorFlow runtime next to the call's result.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TfStatus {
    pub code: u8,
    pub message: String,
}

impl TfStatus {
    pub fn new<S: Into<String>>(code: u8, message: S) -> Self {
        TfStatus {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Turns a non-zero status into an error.
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            return Ok(());
        }
        Err(Error::Backend {
            code: self.code as i32,
            message: self.message,
        })
    }
}

fn check_model(session: &Session, model: &Resource) -> Result<()> {
    session.ensure_live()?;
    model.ensure_live()?;
    model.ensure_kind(ResourceType::Model)?;
    session.ensure_registered(model)
}

pub fn model_load(session: &Session, model: &Resource) -> Result<TfStatus> {
    check_model(session, model)?;
    tracing::debug!(session = session.id(), model = model.id(), "tf model load");
    session.executor().tf_model_load(session, model)
}

/// Runs a loaded graph, feeding `inputs` into `in_nodes` and fetching one
/// tensor per entry of `out_nodes` into `outputs`.
pub fn model_run(
    session: &Session,
    model: &Resource,
    options: Option<&TfBuffer>,
    in_nodes: &[TfNode],
    inputs: &[TfTensor<'_>],
    out_nodes: &[TfNode],
    outputs: &mut [Option<TfTensor<'static>>],
) -> Result<TfStatus> {
    check_model(session, model)?;
    if outputs.is_empty() {
        return Err(Error::invalid("at least one output must be declared"));
    }
    if in_nodes.len() != inputs.len() {
        return Err(Error::invalid(format!(
            "{} input nodes for {} input tensors",
            in_nodes.len(),
            inputs.len()
        )));
    }
    if out_nodes.len() != outputs.len() {
        return Err(Error::invalid(format!(
            "{} output nodes for {} output tensors",
            out_nodes.len(),
            outputs.len()
        )));
    }

    let views = inputs.iter().map(Tensor::view).collect::<Vec<_>>();
    tracing::debug!(
        session = session.id(),
        model = model.id(),
        nr_inputs = views.len(),
        nr_outputs = outputs.len(),
        "tf model run"
    );

    let (produced, status) = session.executor().tf_model_run(
        session,
        model,
        options.and_then(TfBuffer::data),
        in_nodes,
        &views,
        out_nodes,
    )?;
    decode_outputs(produced, outputs)?;
    Ok(status)
}

pub fn model_unload(session: &Session, model: &Resource) -> Result<TfStatus> {
    check_model(session, model)?;
    tracing::debug!(session = session.id(), model = model.id(), "tf model unload");
    session.executor().tf_model_unload(session, model)
}

#[cfg(test)]
mod tests {
    use crate::backend::{Executor, ExecutorTensor, TensorView, TfOutputs};
    use crate::error::{Error, Result};
    use crate::ops::tf::{
        model_load, model_run, model_unload, TfBuffer, TfDataType, TfNode, TfStatus, TfTensor,
    };
    use crate::session::blob::Blob;
    use crate::session::resource::{Resource, ResourceType};
    use crate::session::Session;
    use crate::tensor::data::DataType;
    use std::sync::Arc;

    // returns one int64 tensor per output node holding the node id
    struct Graph;

    impl Executor for Graph {
        fn name(&self) -> &str {
            "graph"
        }

        fn session_init(&self, _flags: u32) -> Result<u64> {
            Ok(3)
        }

        fn session_release(&self, _id: u64) -> Result<()> {
            Ok(())
        }

        fn tf_model_load(&self, _session: &Session, _model: &Resource) -> Result<TfStatus> {
            Ok(TfStatus::new(0, "loaded"))
        }

        fn tf_model_run(
            &self,
            _session: &Session,
            _model: &Resource,
            _options: Option<&[u8]>,
            _in_nodes: &[TfNode],
            _inputs: &[TensorView<'_, i64>],
            out_nodes: &[TfNode],
        ) -> Result<TfOutputs> {
            let produced = out_nodes
                .iter()
                .map(|n| {
                    Some(ExecutorTensor::new(
                        vec![1],
                        TfDataType::Int64.code(),
                        (n.id as i64).to_ne_bytes().to_vec(),
                    ))
                })
                .collect();
            Ok((produced, TfStatus::new(0, "ok")))
        }

        fn tf_model_unload(&self, _session: &Session, _model: &Resource) -> Result<TfStatus> {
            Ok(TfStatus::new(0, "unloaded"))
        }
    }

    fn setup() -> (Session, Resource) {
        let mut sess = Session::with_executor(Arc::new(Graph), 0).unwrap();
        let model = Resource::from_blobs(vec![Blob::new("saved_model.pb", vec![0])], ResourceType::Model)
            .unwrap();
        sess.register(&model).unwrap();
        (sess, model)
    }

    #[test]
    fn test_model_run() {
        let (sess, model) = setup();
        assert!(model_load(&sess, &model).unwrap().is_ok());

        let in_nodes = [TfNode::new("serving_default_input_1", 0).unwrap()];
        let out_nodes = [
            TfNode::new("StatefulPartitionedCall", 0).unwrap(),
            TfNode::new("StatefulPartitionedCall", 1).unwrap(),
        ];
        let input = TfTensor::from_slice(&[1, 2], TfDataType::Float, &[0.5f32, 1.0]).unwrap();
        let options = TfBuffer::new(vec![0; 4]);
        let mut outputs: [Option<TfTensor<'static>>; 2] = [None, None];

        let status = model_run(
            &sess,
            &model,
            Some(&options),
            &in_nodes,
            &[input],
            &out_nodes,
            &mut outputs,
        )
        .unwrap();
        assert_eq!(status.message, "ok");

        let ids = outputs
            .iter()
            .map(|t| t.as_ref().unwrap().to_vec::<i64>().unwrap()[0])
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 1]);

        assert_eq!(model_unload(&sess, &model).unwrap().message, "unloaded");
    }

    #[test]
    fn test_node_counts() {
        let (sess, model) = setup();
        let node = TfNode::new("x", 0).unwrap();
        let input = TfTensor::from_slice(&[1], TfDataType::Float, &[0.5f32]).unwrap();
        let mut outputs: [Option<TfTensor<'static>>; 1] = [None];

        let r = model_run(&sess, &model, None, &[], &[input], &[node], &mut outputs);
        assert!(matches!(r, Err(Error::InvalidArgument(_))));
        assert!(TfNode::new("", 0).is_err());
    }

    #[test]
    fn test_status() {
        assert!(TfStatus::new(0, "").into_result().is_ok());
        let e = TfStatus::new(3, "bad graph").into_result().unwrap_err();
        assert!(matches!(e, Error::Backend { code: 3, .. }));
    }

    #[test]
    fn test_data_types() {
        assert_eq!(TfDataType::COMPLEX, TfDataType::Complex64);
        assert_eq!(TfDataType::from_code(23), Some(TfDataType::Uint64));
        assert_eq!(TfDataType::String.bytes(), None);
        assert_eq!(TfDataType::Complex128.bytes(), Some(16));
    }
}
