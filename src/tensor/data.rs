use num_traits::PrimInt;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

/// Element type enumeration of one operation family.
///
/// Each family (torch, tf, tflite, ...) has its own numeric codes and its
/// own integer type for dimensions; the tensor cell is generic over both.
pub trait DataType: Copy + Eq + Debug + Display + Send + Sync + 'static {
    type Dim: PrimInt + Debug + Display + Send + Sync + 'static;

    const FAMILY: &'static str;

    fn code(&self) -> u32;

    fn from_code(code: u32) -> Option<Self>;

    /// Size of one element in bytes, `None` for variable-sized types.
    fn bytes(&self) -> Option<usize>;

    fn is_float32(&self) -> bool;
}

macro_rules! data_type_enum {
    (
        $(#[$meta:meta])*
        $name:ident, dim = $dim:ty, family = $family:literal, float32 = $f32:ident,
        { $($variant:ident = $code:literal, $bytes:expr, $label:literal;)* }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($variant = $code,)*
        }

        impl $crate::tensor::data::DataType for $name {
            type Dim = $dim;

            const FAMILY: &'static str = $family;

            fn code(&self) -> u32 {
                *self as u32
            }

            fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)*
                    _ => None,
                }
            }

            fn bytes(&self) -> Option<usize> {
                match self {
                    $($name::$variant => $bytes,)*
                }
            }

            fn is_float32(&self) -> bool {
                matches!(self, $name::$f32)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($name::$variant => write!(f, $label),)*
                }
            }
        }
    };
}

pub(crate) use data_type_enum;

/// Bytes held by a tensor cell.
///
/// `Owned` storage is freed by the cell that holds it; `Borrowed` storage
/// belongs to someone else and is never freed here.
pub enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

impl<'a> Storage<'a> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => &v[..],
            Storage::Borrowed(s) => &s[..],
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Storage::Owned(_))
    }

    /// Owned bytes, copying if the storage is borrowed.
    pub fn into_owned(self) -> Vec<u8> {
        match self {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s.to_vec(),
        }
    }
}

impl<'a> From<Vec<u8>> for Storage<'a> {
    fn from(v: Vec<u8>) -> Self {
        Storage::Owned(v)
    }
}

impl<'a> From<&'a [u8]> for Storage<'a> {
    fn from(s: &'a [u8]) -> Self {
        Storage::Borrowed(s)
    }
}

impl Debug for Storage<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Owned(v) => write!(f, "Owned({} bytes)", v.len()),
            Storage::Borrowed(s) => write!(f, "Borrowed({} bytes)", s.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::data::{data_type_enum, DataType, Storage};

    data_type_enum! {
        Sample, dim = i64, family = "sample", float32 = Float, {
            Float = 1, Some(4), "float";
            Text = 2, None, "text";
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(Sample::Float.code(), 1);
        assert_eq!(Sample::from_code(2), Some(Sample::Text));
        assert_eq!(Sample::from_code(9), None);
        assert_eq!(Sample::Float.bytes(), Some(4));
        assert_eq!(Sample::Text.bytes(), None);
        assert!(Sample::Float.is_float32());
        assert_eq!(Sample::Text.to_string(), "text");
    }

    #[test]
    fn test_storage() {
        let bytes = [1u8, 2, 3];
        let s = Storage::from(&bytes[..]);
        assert!(!s.is_owned());
        assert_eq!(s.len(), 3);
        assert_eq!(s.into_owned(), vec![1, 2, 3]);

        let s = Storage::from(vec![0u8; 4]);
        assert!(s.is_owned());
        assert_eq!(format!("{:?}", s), "Owned(4 bytes)");
    }
}
