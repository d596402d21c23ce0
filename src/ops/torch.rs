use crate::error::{Error, Result};
use crate::session::resource::{Resource, ResourceType};
use crate::session::Session;
use crate::tensor::data::data_type_enum;
use crate::tensor::{decode_outputs, Tensor};

data_type_enum! {
    /// Element types of torch tensors.
    TorchDataType, dim = i64, family = "torch", float32 = Float, {
        Byte = 1, Some(1), "byte";
        Char = 2, Some(1), "char";
        Short = 3, Some(2), "short";
        Int = 4, Some(4), "int";
        Long = 5, Some(8), "long";
        Half = 6, Some(2), "half";
        Float = 7, Some(4), "float";
    }
}

pub type TorchTensor<'a> = Tensor<'a, TorchDataType>;

/// Opaque run options passed along with a model run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TorchBuffer {
    data: Option<Vec<u8>>,
}

impl TorchBuffer {
    pub fn new(data: &str) -> Self {
        Self::from_bytes(data.as_bytes().to_vec())
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        TorchBuffer { data: Some(data) }
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

fn check_model(session: &Session, model: &Resource) -> Result<()> {
    session.ensure_live()?;
    model.ensure_live()?;
    model.ensure_kind(ResourceType::Model)?;
    session.ensure_registered(model)
}

pub fn model_load(session: &Session, model: &Resource) -> Result<()> {
    check_model(session, model)?;
    tracing::debug!(session = session.id(), model = model.id(), "torch model load");
    session.executor().torch_model_load(session, model)
}

/// Runs a loaded model.
///
/// `outputs` declares how many tensors the model produces; each slot the
/// executor fills receives a tensor that owns its data. On error, slots
/// filled before the failure keep their tensors.
pub fn model_run(
    session: &Session,
    model: &Resource,
    options: Option<&TorchBuffer>,
    inputs: &[TorchTensor<'_>],
    outputs: &mut [Option<TorchTensor<'static>>],
) -> Result<()> {
    check_model(session, model)?;
    if outputs.is_empty() {
        return Err(Error::invalid("at least one output must be declared"));
    }

    let views = inputs.iter().map(Tensor::view).collect::<Vec<_>>();
    tracing::debug!(
        session = session.id(),
        model = model.id(),
        nr_inputs = views.len(),
        nr_outputs = outputs.len(),
        "torch model run"
    );

    let produced = session.executor().torch_model_run(
        session,
        model,
        options.and_then(TorchBuffer::data),
        &views,
        outputs.len(),
    )?;
    decode_outputs(produced, outputs)
}
