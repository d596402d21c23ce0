use crate::args::{dispatch, ArgList};
use crate::error::Result;
use crate::session::resource::{Resource, ResourceType};
use crate::session::Session;
use std::path::Path;

/// Runs `symbol` from the code library at `library`.
pub fn exec<P: AsRef<Path>>(
    session: &Session,
    library: P,
    symbol: &str,
    read: &ArgList<'_>,
    write: &mut ArgList<'_>,
) -> Result<()> {
    session.ensure_live()?;
    let library = library.as_ref();
    tracing::debug!(session = session.id(), library = %library.display(), symbol, "exec");

    dispatch(write, |w| {
        session
            .executor()
            .exec(session, library, symbol, read.args(), w)
    })
}

/// Runs `symbol` from a library resource registered with `session`.
pub fn exec_with_resource(
    session: &Session,
    resource: &Resource,
    symbol: &str,
    read: &ArgList<'_>,
    write: &mut ArgList<'_>,
) -> Result<()> {
    session.ensure_live()?;
    resource.ensure_kind(ResourceType::Lib)?;
    session.ensure_registered(resource)?;
    tracing::debug!(session = session.id(), resource = resource.id(), symbol, "exec with resource");

    dispatch(write, |w| {
        session
            .executor()
            .exec_with_resource(session, resource, symbol, read.args(), w)
    })
}

#[cfg(test)]
mod tests {
    use crate::args::ArgList;
    use crate::backend::native::Native;
    use crate::error::Error;
    use crate::ops::exec::{exec, exec_with_resource};
    use crate::session::blob::Blob;
    use crate::session::resource::{Resource, ResourceType};
    use crate::session::Session;
    use std::sync::Arc;

    fn session() -> Session {
        Session::with_executor(Arc::new(Native::new()), 0).unwrap()
    }

    #[test]
    fn test_exec() {
        let lib = tempfile::NamedTempFile::new().unwrap();
        let sess = session();

        let mut read = ArgList::with_capacity(1).unwrap();
        read.add_int32_arg(10).unwrap();
        let mut out = [0u8; 4];
        let mut write = ArgList::with_capacity(1).unwrap();
        write.expect_serial_arg(&mut out).unwrap();

        exec(&sess, lib.path(), "mytestfunc", &read, &mut write).unwrap();
        assert_eq!(write.extract_int32_arg(0).unwrap(), 20);

        let r = exec(&sess, "/no/such/lib.so", "mytestfunc", &read, &mut write);
        assert!(matches!(r, Err(Error::NotFound(_))));
        assert!(write.extract_int32_arg(0).is_err());
    }

    #[test]
    fn test_exec_with_resource() {
        let mut sess = session();
        let lib = Resource::from_blobs(vec![Blob::new("libmytestlib.so", vec![0x7f])], ResourceType::Lib)
            .unwrap();
        let model = Resource::from_blobs(vec![Blob::new("model.pt", vec![1])], ResourceType::Model)
            .unwrap();

        let mut read = ArgList::with_capacity(1).unwrap();
        read.add_int32_arg(-4).unwrap();
        let mut write = ArgList::with_capacity(1).unwrap();
        write.expect_non_serial_arg(4).unwrap();

        let r = exec_with_resource(&sess, &lib, "mytestfunc", &read, &mut write);
        assert!(matches!(r, Err(Error::NotRegistered { .. })));

        sess.register(&lib).unwrap();
        sess.register(&model).unwrap();
        exec_with_resource(&sess, &lib, "mytestfunc", &read, &mut write).unwrap();
        assert_eq!(write.extract_int32_arg(0).unwrap(), -8);

        let r = exec_with_resource(&sess, &model, "mytestfunc", &read, &mut write);
        assert!(matches!(r, Err(Error::InvalidArgument(_))));
    }
}
