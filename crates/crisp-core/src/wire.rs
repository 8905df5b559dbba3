//! Bounds-checked big-endian reader for packet bodies.
//!
//! Every read fails with `MalformedPacket` instead of panicking when the
//! buffer is short.

use bytes::Buf;

use crate::error::{CodecError, Result};

/// Cursor over a borrowed byte slice, advanced through [`Buf`].
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize, field: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(CodecError::malformed(format!(
                "truncated {}: need {} bytes, have {}",
                field,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        self.need(n, field)?;
        let head = &self.buf[..n];
        self.buf.advance(n);
        Ok(head)
    }

    pub(crate) fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N]> {
        self.need(N, field)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, field: &str) -> Result<u8> {
        self.need(1, field)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self, field: &str) -> Result<u16> {
        self.need(2, field)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn u32(&mut self, field: &str) -> Result<u32> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn u64(&mut self, field: &str) -> Result<u64> {
        self.need(8, field)?;
        Ok(self.buf.get_u64())
    }

    pub(crate) fn f32(&mut self, field: &str) -> Result<f32> {
        self.need(4, field)?;
        Ok(self.buf.get_f32())
    }

    pub(crate) fn utf8(&mut self, n: usize, field: &str) -> Result<String> {
        let bytes = self.take(n, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::malformed(format!("{} is not valid UTF-8", field)))
    }

    /// Consume everything that is left.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf.advance(rest.len());
        rest
    }

    /// Fail if unread bytes remain.
    pub(crate) fn finish(self, what: &str) -> Result<()> {
        if !self.buf.has_remaining() {
            Ok(())
        } else {
            Err(CodecError::malformed(format!(
                "{} has {} trailing bytes",
                what,
                self.buf.remaining()
            )))
        }
    }
}

/// Check that a length fits the width of its length prefix.
pub(crate) fn check_len(field: &'static str, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(CodecError::FieldTooLong { field, len, max });
    }
    Ok(())
}
