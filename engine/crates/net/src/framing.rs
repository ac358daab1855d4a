//! Splits a TCP byte stream into packets.
//!
//! The control protocol carries no length prefix: a frame ends where its
//! opcode's layout says it ends. Bytes are buffered until a whole packet
//! decodes; a buffer that grows past the frame limit without yielding one
//! is a protocol error.

use std::marker::PhantomData;

use bytes::{Buf, BytesMut};

use crate::codec::{CodecError, Decode};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{buffered} bytes buffered without a complete frame (limit {max})")]
    Oversized { buffered: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Packet(T),
    /// Unknown opcode; the bytes buffered behind it were dropped.
    Unknown { opcode: u16, discarded: usize },
}

#[derive(Debug)]
pub struct FrameDecoder<T> {
    buf: BytesMut,
    max_frame_bytes: usize,
    _packet: PhantomData<fn() -> T>,
}

impl<T: Decode> FrameDecoder<T> {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame_bytes,
            _packet: PhantomData,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, `Ok(None)` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame<T>>, FrameError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match T::decode_prefix(&self.buf) {
            Ok((packet, used)) => {
                self.buf.advance(used);
                Ok(Some(Frame::Packet(packet)))
            }
            Err(CodecError::Truncated { .. }) => {
                if self.buf.len() >= self.max_frame_bytes {
                    Err(FrameError::Oversized {
                        buffered: self.buf.len(),
                        max: self.max_frame_bytes,
                    })
                } else {
                    Ok(None)
                }
            }
            Err(CodecError::UnknownOpcode(opcode)) => {
                // Without a layout the payload length is unknowable; drop
                // what has arrived so far and resynchronise on the next read.
                let discarded = self.buf.len();
                self.buf.clear();
                Ok(Some(Frame::Unknown { opcode, discarded }))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encode;
    use crate::protocol::{ChatChannel, ClientPacket};

    #[test]
    fn reassembles_split_and_coalesced_packets() {
        let a = ClientPacket::Identify { account: 5 }.to_bytes();
        let b = ClientPacket::Chat {
            channel: ChatChannel::Global,
            message: "hi".into(),
        }
        .to_bytes();
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let mut dec = FrameDecoder::<ClientPacket>::new(DEFAULT_MAX_FRAME_BYTES);
        dec.extend(&stream[..3]);
        assert_eq!(dec.next_frame().unwrap(), None);
        dec.extend(&stream[3..]);
        assert_eq!(
            dec.next_frame().unwrap(),
            Some(Frame::Packet(ClientPacket::Identify { account: 5 }))
        );
        assert!(matches!(dec.next_frame().unwrap(), Some(Frame::Packet(ClientPacket::Chat { .. }))));
        assert_eq!(dec.next_frame().unwrap(), None);
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn unknown_opcode_discards_buffer() {
        let mut dec = FrameDecoder::<ClientPacket>::new(DEFAULT_MAX_FRAME_BYTES);
        dec.extend(&[0x99, 0x00, 1, 2, 3]);
        assert_eq!(
            dec.next_frame().unwrap(),
            Some(Frame::Unknown {
                opcode: 0x0099,
                discarded: 5
            })
        );
        dec.extend(&ClientPacket::Keepalive.to_bytes());
        assert_eq!(dec.next_frame().unwrap(), Some(Frame::Packet(ClientPacket::Keepalive)));
    }

    #[test]
    fn runaway_string_hits_frame_limit() {
        let mut dec = FrameDecoder::<ClientPacket>::new(16);
        dec.extend(&[0x02, 0x00, 0x00]);
        dec.extend(&[b'x'; 20]);
        assert!(matches!(dec.next_frame(), Err(FrameError::Oversized { .. })));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let mut dec = FrameDecoder::<ClientPacket>::new(DEFAULT_MAX_FRAME_BYTES);
        dec.extend(&[0x02, 0x00, 0x09, b'a', 0x00]);
        assert!(matches!(
            dec.next_frame(),
            Err(FrameError::Codec(CodecError::InvalidValue { .. }))
        ));
    }
}
