use crate::args::{dispatch, ArgList};
use crate::error::{Error, Result};
use crate::session::Session;
use std::fmt::{Display, Formatter};

pub mod exec;
pub mod image;
pub mod tf;
pub mod tflite;
pub mod torch;

macro_rules! op_types {
    ($($variant:ident = $code:literal, $name:literal;)*) => {
        /// Operation codes understood by executors. The code is the first
        /// argument of every generic invocation.
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        #[repr(i32)]
        pub enum OpType {
            $($variant = $code,)*
        }

        impl OpType {
            pub const ALL: &'static [OpType] = &[$(OpType::$variant,)*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(OpType::$variant => $name,)*
                }
            }
        }

        impl TryFrom<i32> for OpType {
            type Error = Error;

            fn try_from(code: i32) -> Result<Self> {
                match code {
                    $($code => Ok(OpType::$variant),)*
                    other => Err(Error::unsupported(format!("op code {}", other))),
                }
            }
        }
    };
}

op_types! {
    Noop = 0, "noop";
    BlasSgemm = 1, "blas_sgemm";
    ImageClassify = 2, "image_classify";
    ImageDetect = 3, "image_detect";
    ImageSegment = 4, "image_segment";
    ImagePose = 5, "image_pose";
    ImageDepth = 6, "image_depth";
    Exec = 7, "exec";
    TfModelNew = 8, "tf_model_new";
    TfModelDestroy = 9, "tf_model_destroy";
    TfModelRegister = 10, "tf_model_register";
    TfModelUnregister = 11, "tf_model_unregister";
    TfSessionLoad = 12, "tf_session_load";
    TfSessionRun = 13, "tf_session_run";
    TfSessionDelete = 14, "tf_session_delete";
    Minmax = 15, "minmax";
    FpgaArrayCopy = 16, "fpga_arraycopy";
    FpgaMMult = 17, "fpga_mmult";
    FpgaParallel = 18, "fpga_parallel";
    FpgaVectorAdd = 19, "fpga_vectoradd";
    ExecWithResource = 20, "exec_with_resource";
    TorchJitloadForward = 21, "torch_jitload_forward";
    TorchSgemm = 22, "torch_sgemm";
    Opencv = 23, "opencv";
    TfliteSessionLoad = 24, "tflite_session_load";
    TfliteSessionRun = 25, "tflite_session_run";
    TfliteSessionDelete = 26, "tflite_session_delete";
}

impl OpType {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

impl Display for OpType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn noop(session: &Session) -> Result<()> {
    session.ensure_live()?;
    session.executor().noop(session)
}

/// Generic invocation: hands both lists to the executor.
///
/// The first slot of `read` is the op code. On success every expected slot of
/// `write` can be extracted; on failure none of them can.
pub fn genop<'a>(session: &Session, read: &ArgList<'_>, write: &mut ArgList<'a>) -> Result<()> {
    session.ensure_live()?;
    if read.is_empty() {
        return Err(Error::invalid("read list is empty"));
    }

    let op = read.args()[0]
        .as_i32()
        .ok()
        .and_then(|code| OpType::try_from(code).ok());
    tracing::debug!(
        session = session.id(),
        op = op.map_or("unknown", |op| op.name()),
        nr_read = read.len(),
        nr_write = write.len(),
        "genop"
    );

    dispatch(write, |w| session.executor().genop(session, read.args(), w)).map_err(|e| {
        tracing::error!(session = session.id(), error = %e, "genop failed");
        e
    })
}
