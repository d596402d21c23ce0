//! Argument lists for generic invocation.
//!
//! A read list carries the inputs of an operation, the first slot usually
//! being the op type. A write list declares the outputs the executor has to
//! fill, each with a size known before the call.

use crate::error::{Error, Result};
use std::fmt::{Debug, Formatter};
use std::mem;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArgKind {
    Serial,
    NonSerial,
}

enum ArgBuf<'a> {
    // caller storage, never freed by the list
    Caller(&'a [u8]),
    CallerMut(&'a mut [u8]),
    // allocated by the list itself
    List(Vec<u8>),
}

/// One slot of an [`ArgList`].
pub struct Arg<'a> {
    kind: ArgKind,
    buf: ArgBuf<'a>,
    expected: bool,
    filled: bool,
}

impl<'a> Arg<'a> {
    fn input(kind: ArgKind, buf: ArgBuf<'a>) -> Self {
        Arg {
            kind,
            buf,
            expected: false,
            filled: true,
        }
    }

    fn output(kind: ArgKind, buf: ArgBuf<'a>) -> Self {
        Arg {
            kind,
            buf,
            expected: true,
            filled: false,
        }
    }

    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this slot is an output the executor fills.
    pub fn is_expected(&self) -> bool {
        self.expected
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Whether the list allocated (and will free) this slot's buffer.
    pub fn is_list_owned(&self) -> bool {
        matches!(self.buf, ArgBuf::List(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.buf {
            ArgBuf::Caller(b) => &b[..],
            ArgBuf::CallerMut(b) => &b[..],
            ArgBuf::List(b) => &b[..],
        }
    }

    /// Writable view of an expected slot.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8]> {
        if !self.expected {
            return Err(Error::invalid("input arguments are read-only"));
        }

        match &mut self.buf {
            ArgBuf::CallerMut(b) => Ok(&mut b[..]),
            ArgBuf::List(b) => Ok(&mut b[..]),
            ArgBuf::Caller(_) => Err(Error::invalid("input arguments are read-only")),
        }
    }

    /// Copies `bytes` into an expected slot; the length must match exactly.
    pub fn fill(&mut self, bytes: &[u8]) -> Result<()> {
        let dst = self.as_bytes_mut()?;
        if dst.len() != bytes.len() {
            return Err(Error::invalid(format!(
                "expected argument of {} bytes, got {}",
                dst.len(),
                bytes.len()
            )));
        }
        dst.copy_from_slice(bytes);
        Ok(())
    }

    pub fn as_i32(&self) -> Result<i32> {
        let bytes: [u8; 4] = self
            .as_bytes()
            .try_into()
            .map_err(|_| Error::invalid(format!("{} byte argument is not an int32", self.len())))?;
        Ok(i32::from_ne_bytes(bytes))
    }

    pub fn as_u64(&self) -> Result<u64> {
        let bytes: [u8; 8] = self
            .as_bytes()
            .try_into()
            .map_err(|_| Error::invalid(format!("{} byte argument is not a uint64", self.len())))?;
        Ok(u64::from_ne_bytes(bytes))
    }

    /// UTF-8 view of a string argument, without trailing NULs.
    pub fn as_str(&self) -> Result<&str> {
        let bytes = self.as_bytes();
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        std::str::from_utf8(&bytes[..end]).map_err(|_| Error::invalid("argument is not valid UTF-8"))
    }
}

impl Debug for Arg<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arg")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("expected", &self.expected)
            .field("filled", &self.filled)
            .field("list_owned", &self.is_list_owned())
            .finish()
    }
}

/// Encoding for arguments that are not flat byte buffers.
///
/// The caller owns both directions: `encode` for inputs and `decode` for
/// outputs extracted after the call.
pub trait ArgCodec {
    type Value;

    fn encode(&self, value: &Self::Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Value>;
}

/// Ordered, fixed-capacity list of arguments.
#[derive(Debug)]
pub struct ArgList<'a> {
    args: Vec<Arg<'a>>,
    capacity: usize,
}

impl<'a> ArgList<'a> {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut args = Vec::new();
        args.try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory(capacity.saturating_mul(mem::size_of::<Arg>())))?;

        Ok(ArgList { args, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.args.len() >= self.capacity
    }

    pub fn args(&self) -> &[Arg<'a>] {
        &self.args
    }

    pub(crate) fn args_mut(&mut self) -> &mut [Arg<'a>] {
        &mut self.args
    }

    fn push(&mut self, arg: Arg<'a>) -> Result<()> {
        if self.is_full() {
            return Err(Error::OutOfRange {
                index: self.args.len(),
                capacity: self.capacity,
            });
        }
        self.args.push(arg);
        Ok(())
    }

    fn owned_copy(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes.len())
            .map_err(|_| Error::OutOfMemory(bytes.len()))?;
        buf.extend_from_slice(bytes);
        Ok(buf)
    }

    /// Appends caller bytes as an input; the list only borrows them.
    pub fn add_serial_arg(&mut self, buf: &'a [u8]) -> Result<()> {
        self.push(Arg::input(ArgKind::Serial, ArgBuf::Caller(buf)))
    }

    pub fn add_string_arg(&mut self, value: &str) -> Result<()> {
        let copy = Self::owned_copy(value.as_bytes())?;
        self.push(Arg::input(ArgKind::Serial, ArgBuf::List(copy)))
    }

    pub fn add_int32_arg(&mut self, value: i32) -> Result<()> {
        let copy = Self::owned_copy(&value.to_ne_bytes())?;
        self.push(Arg::input(ArgKind::Serial, ArgBuf::List(copy)))
    }

    pub fn add_uint64_arg(&mut self, value: u64) -> Result<()> {
        let copy = Self::owned_copy(&value.to_ne_bytes())?;
        self.push(Arg::input(ArgKind::Serial, ArgBuf::List(copy)))
    }

    /// Appends a structured value through its codec. The encoded bytes are
    /// owned by the list.
    pub fn add_non_serial_arg<C>(&mut self, value: &C::Value, codec: &C) -> Result<()>
    where
        C: ArgCodec,
    {
        if self.is_full() {
            return Err(Error::OutOfRange {
                index: self.args.len(),
                capacity: self.capacity,
            });
        }

        let encoded = codec.encode(value)?;
        self.push(Arg::input(ArgKind::NonSerial, ArgBuf::List(encoded)))
    }

    /// Declares an output written straight into caller storage.
    pub fn expect_serial_arg(&mut self, buf: &'a mut [u8]) -> Result<()> {
        self.push(Arg::output(ArgKind::Serial, ArgBuf::CallerMut(buf)))
    }

    /// Declares an output of `size` bytes held by the list, to be decoded
    /// with [`ArgList::extract_non_serial_arg`].
    pub fn expect_non_serial_arg(&mut self, size: usize) -> Result<()> {
        if self.is_full() {
            return Err(Error::OutOfRange {
                index: self.args.len(),
                capacity: self.capacity,
            });
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory(size))?;
        buf.resize(size, 0);
        self.push(Arg::output(ArgKind::NonSerial, ArgBuf::List(buf)))
    }

    pub fn extract_serial_arg(&self, idx: usize) -> Result<&[u8]> {
        let arg = self.args.get(idx).ok_or(Error::OutOfRange {
            index: idx,
            capacity: self.capacity,
        })?;

        if !arg.filled {
            return Err(Error::invalid(format!(
                "argument {} has not been filled by a successful call",
                idx
            )));
        }
        Ok(arg.as_bytes())
    }

    pub fn extract_int32_arg(&self, idx: usize) -> Result<i32> {
        let bytes: [u8; 4] = self
            .extract_serial_arg(idx)?
            .try_into()
            .map_err(|_| Error::invalid(format!("argument {} is not an int32", idx)))?;
        Ok(i32::from_ne_bytes(bytes))
    }

    pub fn extract_non_serial_arg<C>(&self, idx: usize, codec: &C) -> Result<C::Value>
    where
        C: ArgCodec,
    {
        codec.decode(self.extract_serial_arg(idx)?)
    }

    /// Drops the list, freeing every buffer it allocated. Caller buffers are
    /// left alone.
    pub fn delete(self) -> Result<()> {
        let owned = self.args.iter().filter(|a| a.is_list_owned()).count();
        tracing::trace!(
            slots = self.args.len(),
            owned,
            "deleting argument list"
        );
        Ok(())
    }

    fn set_filled(&mut self, filled: bool) {
        for arg in self.args.iter_mut().filter(|a| a.expected) {
            arg.filled = filled;
        }
    }
}

/// Runs `call` against the write list, marking its expected slots readable
/// only if the call succeeds.
pub(crate) fn dispatch<'a, F>(write: &mut ArgList<'a>, call: F) -> Result<()>
where
    F: FnOnce(&mut [Arg<'a>]) -> Result<()>,
{
    write.set_filled(false);
    call(write.args_mut())?;
    write.set_filled(true);
    Ok(())
}
