//! WebSocket handshake and frame codec conforming to RFC 6455.
//!
//! This module covers the wire protocol surface of the crate: the HTTP
//! upgrade handshake and single-frame parsing/encoding with client-side
//! masking. Continuation frames and 64-bit extended lengths are out of scope
//! and rejected at parse time.

mod codec;
mod frame;
pub mod handshake;

pub use codec::WsCodec;
pub use frame::{Frame, FrameError, Opcode};
