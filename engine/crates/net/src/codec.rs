//! Little-endian binary primitives shared by the TCP and UDP catalogues.
//!
//! Strings are UTF-8 terminated by a single `0x00`; blobs carry a `u32`
//! length prefix. A reader that runs out of bytes always reports
//! [`CodecError::Truncated`], so a stream decoder can tell "wait for more"
//! apart from "this is garbage".

use bytes::{Buf, BufMut, BytesMut};

/// Longest accepted string, terminator excluded.
pub const MAX_CSTR_BYTES: usize = 64 * 1024;
/// Largest accepted blob payload.
pub const MAX_BLOB_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("payload truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("string exceeds {MAX_CSTR_BYTES} bytes without a terminator")]
    MissingTerminator,

    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    #[error("declared length {len} exceeds limit {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u64 },
}

/// Cursor over a received payload.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, consumed: 0 }
    }

    /// Bytes read so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < n {
            Err(CodecError::Truncated {
                needed: n - self.buf.remaining(),
            })
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, n: usize) {
        self.buf.advance(n);
        self.consumed += n;
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        self.consumed += 1;
        Ok(self.buf.get_u8())
    }

    pub fn bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(CodecError::InvalidValue { field, value: v as u64 }),
        }
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        self.consumed += 2;
        Ok(self.buf.get_u16_le())
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        self.consumed += 4;
        Ok(self.buf.get_u32_le())
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        self.need(8)?;
        self.consumed += 8;
        Ok(self.buf.get_u64_le())
    }

    pub fn i64(&mut self) -> Result<i64, CodecError> {
        self.need(8)?;
        self.consumed += 8;
        Ok(self.buf.get_i64_le())
    }

    pub fn f32(&mut self) -> Result<f32, CodecError> {
        self.need(4)?;
        self.consumed += 4;
        Ok(self.buf.get_f32_le())
    }

    pub fn cstr(&mut self) -> Result<String, CodecError> {
        let window = &self.buf[..self.buf.len().min(MAX_CSTR_BYTES + 1)];
        let Some(end) = window.iter().position(|&b| b == 0) else {
            return if window.len() > MAX_CSTR_BYTES {
                Err(CodecError::MissingTerminator)
            } else {
                Err(CodecError::Truncated { needed: 1 })
            };
        };
        let text = std::str::from_utf8(&self.buf[..end])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_owned();
        self.advance(end + 1);
        Ok(text)
    }

    pub fn blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        if len > MAX_BLOB_BYTES {
            return Err(CodecError::FrameTooLarge {
                len,
                max: MAX_BLOB_BYTES,
            });
        }
        self.need(len)?;
        let bytes = self.buf[..len].to_vec();
        self.advance(len);
        Ok(bytes)
    }

    /// Count-prefixed sequence (`u16` count).
    pub fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let count = self.u16()? as usize;
        let mut out = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            out.push(item(self)?);
        }
        Ok(out)
    }
}

/// Growable output buffer for one outbound frame.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(v as u8)
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16_le(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32_le(v);
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64_le(v);
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.put_i64_le(v);
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.put_f32_le(v);
        self
    }

    /// Writes `s` up to its first interior NUL, then the terminator.
    pub fn cstr(&mut self, s: &str) -> &mut Self {
        let bytes = s.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buf.put_slice(&bytes[..end]);
        self.buf.put_u8(0);
        self
    }

    pub fn blob(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_u32_le(bytes.len() as u32);
        self.buf.put_slice(bytes);
        self
    }

    /// Writes a `u16` count, then each item. Lists longer than `u16::MAX`
    /// are cut to fit.
    pub fn list<T>(&mut self, items: &[T], mut item: impl FnMut(&mut Self, &T)) -> &mut Self {
        let count = items.len().min(u16::MAX as usize);
        self.u16(count as u16);
        for it in &items[..count] {
            item(self, it);
        }
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Types with a fixed wire layout, opcode included.
pub trait Encode {
    fn encode(&self, w: &mut PacketWriter);

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = PacketWriter::new();
        self.encode(&mut w);
        w.into_vec()
    }
}

/// Types decodable from the start of a buffer, opcode included.
pub trait Decode: Sized {
    fn decode(r: &mut PacketReader<'_>) -> Result<Self, CodecError>;

    /// Decodes one value from `bytes`, returning it and the bytes it used.
    fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut r = PacketReader::new(bytes);
        let v = Self::decode(&mut r)?;
        Ok((v, r.consumed()))
    }
}
