use crate::error::{Error, Result};
use crate::session::Session;
use std::fs;
use std::path::Path;

/// Size of each output buffer handed to the executor.
pub const OUT_LEN: usize = 256;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Classification {
    pub text: String,
    pub image_name: String,
}

fn c_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Classifies an encoded image, returning the label text and the name of
/// the image the executor produced.
pub fn classify_image(session: &Session, image: &[u8]) -> Result<Classification> {
    session.ensure_live()?;
    if image.is_empty() {
        return Err(Error::invalid("image is empty"));
    }

    let mut text = [0u8; OUT_LEN];
    let mut image_name = [0u8; OUT_LEN];
    session
        .executor()
        .image_classify(session, image, &mut text, &mut image_name)?;

    Ok(Classification {
        text: c_str(&text),
        image_name: c_str(&image_name),
    })
}

pub fn classify(session: &Session, image: &[u8]) -> Result<String> {
    classify_image(session, image).map(|c| c.text)
}

pub fn classify_file<P: AsRef<Path>>(session: &Session, path: P) -> Result<String> {
    let path = path.as_ref();
    let image = fs::read(path).map_err(|e| Error::from_io(e, path.to_path_buf()))?;
    classify(session, &image)
}
