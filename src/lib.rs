//! Connection acceptance and framing layer for WebSocket servers.
//!
//! This crate accepts raw TCP connections, upgrades them to the WebSocket
//! protocol, decodes single-frame text messages, and routes each decoded
//! [`Message`] to a dynamically assigned [`ClientOwner`]. Owners wait in a
//! FIFO queue; each incoming connection is handed to the oldest waiting owner
//! that still has capacity.

#![warn(clippy::dbg_macro, clippy::print_stdout)]
#![warn(missing_docs)]

/// Connection acceptance, owner assignment, and the polling dispatch loop.
pub mod acceptor;
/// Per-connection state: transport, read buffer, handshake progress, owner.
pub mod client;
/// Immutable message payloads decoded from (or encoded into) frames.
pub mod message;
/// The owner seam: the consumer trait and the FIFO wait queue.
pub mod owner;

/// WebSocket handshake and frame codec conforming to RFC 6455.
pub mod websocket;

pub use acceptor::{AcceptorError, ClientAcceptor, OwnerFactory, POLL_INTERVAL};
pub use client::{Client, ClientState};
pub use message::Message;
pub use owner::{ClientOwner, OwnerQueue};
pub use websocket::{Frame, FrameError, Opcode, WsCodec};
