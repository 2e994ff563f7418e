//! WebSocket codec for use with tokio_util's Decoder and Encoder traits.
//!
//! The decoder turns buffered bytes into routed [`Message`]s: masked text
//! frames yield a message, every other complete frame (control frames,
//! unmasked or non-text data) is consumed and skipped. The encoder produces
//! unmasked single-frame text messages, the only thing this server sends.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{Frame, FrameError, Opcode};
use crate::message::Message;

/// Fewer buffered bytes than this is "not enough data yet" rather than a
/// decode attempt; the poll loop retries on its next pass.
const MIN_DECODE_BYTES: usize = 3;

/// Codec over the restricted framing this server speaks.
#[derive(Debug, Default)]
pub struct WsCodec;

impl WsCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        WsCodec
    }
}

impl Decoder for WsCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < MIN_DECODE_BYTES {
                return Ok(None);
            }

            let (frame, consumed) = match Frame::parse(src) {
                Ok(parsed) => parsed,
                Err(FrameError::IncompleteFrame) => return Ok(None),
                Err(e) => return Err(e),
            };
            src.advance(consumed);

            // Client-to-server data frames must be masked; a frame without a
            // mask, or any non-text frame, produces no message. The bytes
            // are consumed so the next frame parses cleanly.
            if frame.opcode == Opcode::Text && frame.masked {
                return Ok(Some(Message::from_payload(frame.payload)));
            }
            if frame.opcode.is_control() {
                tracing::debug!(opcode = ?frame.opcode, "skipping control frame");
            } else {
                tracing::debug!(opcode = ?frame.opcode, masked = frame.masked, "skipping unroutable data frame");
            }
        }
    }
}

impl Encoder<&Message> for WsCodec {
    type Error = FrameError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Server frames are never masked.
        let encoded = Frame::text(message.payload().to_vec()).encode(None)?;
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
