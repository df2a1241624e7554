//! Little-endian field readers and writers for fixed-shape payloads
//!
//! Every read checks the remaining length first, so a short buffer turns into
//! [`MsgError::MalformedPayload`] instead of a panic inside `bytes`.

use super::MsgError;
use bytes::{Buf, BufMut, BytesMut};

/// Cursor over the payload part of a wire message
pub struct WireReader<'a> {
    buf: &'a [u8],
    kind: &'static str,
}

impl<'a> WireReader<'a> {
    /// `kind` names the payload being decoded and ends up in error messages
    pub fn new(buf: &'a [u8], kind: &'static str) -> Self {
        Self { buf, kind }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn malformed(&self, reason: impl Into<String>) -> MsgError {
        MsgError::MalformedPayload {
            kind: self.kind,
            reason: reason.into(),
        }
    }

    fn need(&self, n: usize) -> Result<(), MsgError> {
        if self.buf.remaining() < n {
            return Err(self.malformed(format!(
                "need {} more bytes, {} left",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, MsgError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u32(&mut self) -> Result<u32, MsgError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn f32(&mut self) -> Result<f32, MsgError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn f64(&mut self) -> Result<f64, MsgError> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    pub fn bool(&mut self) -> Result<bool, MsgError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.malformed(format!("invalid bool byte {}", other))),
        }
    }

    /// A code point stored as `u32`
    pub fn char(&mut self) -> Result<char, MsgError> {
        let raw = self.u32()?;
        char::from_u32(raw).ok_or_else(|| self.malformed(format!("invalid code point {:#x}", raw)))
    }

    /// `u32` byte length followed by UTF-8 bytes
    pub fn string(&mut self) -> Result<String, MsgError> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        let text = std::str::from_utf8(head)
            .map_err(|e| self.malformed(format!("invalid UTF-8: {}", e)))?
            .to_string();
        self.buf = tail;
        Ok(text)
    }

    /// `u32` count followed by that many strings
    pub fn strings(&mut self) -> Result<Vec<String>, MsgError> {
        let count = self.u32()? as usize;
        // Every string carries at least its 4-byte length
        if count > self.remaining() / 4 {
            return Err(self.malformed(format!(
                "{} strings declared, only {} bytes left",
                count,
                self.remaining()
            )));
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.string()?);
        }
        Ok(out)
    }
}

/// Append-only payload writer
#[derive(Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    pub fn bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn char(&mut self, value: char) {
        self.buf.put_u32_le(u32::from(value));
    }

    pub fn string(&mut self, value: &str) {
        self.buf.put_u32_le(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
    }

    pub fn strings(&mut self, values: &[String]) {
        self.buf.put_u32_le(values.len() as u32);
        for value in values {
            self.string(value);
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
