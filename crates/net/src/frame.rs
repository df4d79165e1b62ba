//! Length-prefixed frame encoding/decoding
//!
//! Wire format: [2-byte big-endian length][UTF-8 payload]
//! The length counts payload bytes only, so one frame carries at most 64 KiB - 1.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Size of the length prefix
pub const HEADER_SIZE: usize = 2;

/// Maximum payload a single frame can carry
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Encode a text payload into a single frame
///
/// The length is written as a placeholder first and patched once the payload
/// has been appended, so it always matches the serialized byte count.
pub fn encode_frame(payload: &str) -> Result<Bytes> {
    let bytes = payload.as_bytes();
    if bytes.len() > MAX_PAYLOAD {
        return Err(Error::FrameTooLarge {
            size: bytes.len(),
            max: MAX_PAYLOAD,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + bytes.len());
    buf.put_u16(0);
    buf.put_slice(bytes);

    let len = (buf.len() - HEADER_SIZE) as u16;
    buf[..HEADER_SIZE].copy_from_slice(&len.to_be_bytes());

    Ok(buf.freeze())
}

/// What the decoder is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Length,
    Payload(usize),
}

/// Incremental decoder for one byte stream
///
/// Bytes are pushed as they arrive; complete payloads are pulled out with
/// [`FramedChannel::next_payload`] or the [`FramedChannel::payloads`] iterator.
/// Once a length prefix has been consumed it is kept until the whole payload
/// is buffered, however the bytes are split across pushes.
#[derive(Debug)]
pub struct FramedChannel {
    buf: BytesMut,
    state: ReadState,
}

impl FramedChannel {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: ReadState::Length,
        }
    }

    /// Append newly received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet returned as a payload
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete payload, if one is buffered
    pub fn next_payload(&mut self) -> Result<Option<String>> {
        if self.state == ReadState::Length {
            if self.buf.len() < HEADER_SIZE {
                return Ok(None);
            }
            let len = self.buf.get_u16() as usize;
            self.state = ReadState::Payload(len);
        }

        let ReadState::Payload(len) = self.state else {
            return Ok(None);
        };
        if self.buf.len() < len {
            return Ok(None);
        }

        let payload = self.buf.split_to(len);
        self.state = ReadState::Length;

        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|_| Error::InvalidUtf8)
    }

    /// Iterate over every complete payload currently buffered
    ///
    /// The iterator ends when more bytes are needed; it can be started again
    /// after the next [`FramedChannel::push`].
    pub fn payloads(&mut self) -> Payloads<'_> {
        Payloads { channel: self }
    }
}

impl Default for FramedChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`FramedChannel::payloads`]
pub struct Payloads<'a> {
    channel: &'a mut FramedChannel,
}

impl Iterator for Payloads<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.channel.next_payload().transpose()
    }
}
