use crate::error::{Error, Result};
use crate::session::resource::{Resource, ResourceType};
use crate::session::Session;
use crate::tensor::data::data_type_enum;
use crate::tensor::{decode_outputs, Tensor};

data_type_enum! {
    /// Element types of TensorFlow Lite tensors.
    TfLiteDataType, dim = i32, family = "tflite", float32 = Float32, {
        NoType = 0, None, "notype";
        Float32 = 1, Some(4), "float32";
        Int32 = 2, Some(4), "int32";
        Uint8 = 3, Some(1), "uint8";
        Int64 = 4, Some(8), "int64";
        String = 5, None, "string";
        Bool = 6, Some(1), "bool";
        Int16 = 7, Some(2), "int16";
        Complex64 = 8, Some(8), "complex64";
        Int8 = 9, Some(1), "int8";
        Float16 = 10, Some(2), "float16";
        Float64 = 11, Some(8), "float64";
        Complex128 = 12, Some(16), "complex128";
        Uint64 = 13, Some(8), "uint64";
        Resource = 14, None, "resource";
        Variant = 15, None, "variant";
        Uint32 = 16, Some(4), "uint32";
        Uint16 = 17, Some(2), "uint16";
        Int4 = 18, None, "int4";
    }
}

pub type TfLiteTensor<'a> = Tensor<'a, TfLiteDataType>;

/// An interpreter for one model, bound to a session.
#[derive(Debug)]
pub struct TfLiteSession<'s> {
    session: &'s Session,
    model: Resource,
    deleted: bool,
}

impl<'s> TfLiteSession<'s> {
    pub fn new(session: &'s Session, model: &Resource) -> Result<Self> {
        session.ensure_live()?;
        model.ensure_live()?;
        model.ensure_kind(ResourceType::Model)?;
        session.ensure_registered(model)?;

        Ok(TfLiteSession {
            session,
            model: model.clone(),
            deleted: false,
        })
    }

    pub fn model(&self) -> &Resource {
        &self.model
    }

    fn ensure_live(&self) -> Result<()> {
        if self.deleted {
            return Err(Error::invalid("tflite session has been deleted"));
        }
        self.session.ensure_live()
    }

    pub fn load(&mut self) -> Result<()> {
        self.ensure_live()?;
        tracing::debug!(session = self.session.id(), model = self.model.id(), "tflite session load");
        self.session
            .executor()
            .tflite_session_load(self.session, &self.model)
    }

    /// Runs the interpreter, returning the interpreter's status byte.
    pub fn run(
        &self,
        inputs: &[TfLiteTensor<'_>],
        outputs: &mut [Option<TfLiteTensor<'static>>],
    ) -> Result<u8> {
        self.ensure_live()?;
        if outputs.is_empty() {
            return Err(Error::invalid("at least one output must be declared"));
        }

        let views = inputs.iter().map(Tensor::view).collect::<Vec<_>>();
        let (produced, status) = self.session.executor().tflite_session_run(
            self.session,
            &self.model,
            &views,
            outputs.len(),
        )?;
        tracing::debug!(session = self.session.id(), model = self.model.id(), status, "tflite session run");

        decode_outputs(produced, outputs)?;
        Ok(status)
    }

    /// Tears the interpreter down. The handle is unusable afterwards unless
    /// the executor refused.
    pub fn delete(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.session
            .executor()
            .tflite_session_delete(self.session, &self.model)?;
        self.deleted = true;
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}
