//! Length-prefixed framing for byte-stream transports
//!
//! ```text
//! ┌────────────┬──────────────────────┐
//! │ LENGTH u8  │ PAYLOAD (LENGTH B)   │
//! └────────────┴──────────────────────┘
//! ```
//!
//! Frames may arrive split across any number of reads, or several per read.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};

/// Largest payload a one-byte length can describe
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingLength,
    AwaitingPayload(usize),
}

/// Incremental frame decoder
///
/// Bytes are only ever consumed as a length byte or as a full payload, so a
/// partial frame stays buffered until the rest of it arrives.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: State,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_PAYLOAD + 1),
            state: State::AwaitingLength,
        }
    }

    /// Append received bytes and return every frame completed by them, in order
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.state {
                State::AwaitingLength => {
                    if !self.buffer.has_remaining() {
                        break;
                    }
                    let length = self.buffer.get_u8() as usize;
                    self.state = State::AwaitingPayload(length);
                }
                State::AwaitingPayload(length) => {
                    if self.buffer.len() < length {
                        break;
                    }
                    frames.push(self.buffer.split_to(length).freeze());
                    self.state = State::AwaitingLength;
                }
            }
        }
        frames
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Prefix `payload` with its length
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    Ok(frame)
}
