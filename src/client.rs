//! Per-connection state for one accepted, possibly-handshaken client.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Encoder;

use crate::acceptor::AcceptorError;
use crate::message::Message;
use crate::owner::ClientOwner;
use crate::websocket::WsCodec;

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Transport accepted, no bytes processed yet.
    Accepted,
    /// Part of the upgrade request is buffered, waiting for the blank line.
    HandshakePending,
    /// Upgrade complete; frames flow.
    Connected,
    /// Transport closed or failed; the registry sweeps this client.
    Closed,
}

/// One accepted connection: the transport, its read buffer and codec, the
/// handshake state, and a handle to the assigned owner.
pub struct Client {
    id: u64,
    peer: Option<SocketAddr>,
    pub(crate) io: Mutex<ClientIo>,
    state: StdMutex<ClientState>,
    // Strong: factory-made owners have no other keeper once the queue drops
    // them, so the binding keeps the owner alive for routing.
    owner: StdMutex<Option<Arc<dyn ClientOwner>>>,
}

pub(crate) struct ClientIo {
    pub(crate) stream: TcpStream,
    pub(crate) buffer: BytesMut,
    pub(crate) codec: WsCodec,
}

impl Client {
    pub(crate) fn new(id: u64, stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Client {
            id,
            peer,
            io: Mutex::new(ClientIo {
                stream,
                buffer: BytesMut::with_capacity(8192),
                codec: WsCodec::new(),
            }),
            state: StdMutex::new(ClientState::Accepted),
            owner: StdMutex::new(None),
        }
    }

    /// Registry-unique id, assigned at accept time.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peer address of the transport, if it was available at accept time.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.state.lock().expect("client state lock poisoned")
    }

    /// Whether the WebSocket handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Whether this client's lifecycle has ended.
    pub fn is_closed(&self) -> bool {
        self.state() == ClientState::Closed
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        *self.state.lock().expect("client state lock poisoned") = state;
    }

    pub(crate) fn mark_closed(&self) {
        self.set_state(ClientState::Closed);
    }

    /// Record the owner this client was handed to.
    pub(crate) fn bind_owner(&self, owner: &Arc<dyn ClientOwner>) {
        *self.owner.lock().expect("client owner lock poisoned") = Some(Arc::clone(owner));
    }

    /// The owner this client is bound to, if one is assigned.
    pub fn owner(&self) -> Option<Arc<dyn ClientOwner>> {
        self.owner
            .lock()
            .expect("client owner lock poisoned")
            .clone()
    }

    /// Encode `message` as a single unmasked text frame and write it to the
    /// transport.
    ///
    /// Only connected clients can be written to. A transport write failure
    /// closes this client and ends its lifecycle; the caller may reconnect
    /// with a fresh transport, but this instance is done.
    pub async fn send(&self, message: &Message) -> Result<(), AcceptorError> {
        if !self.is_connected() {
            return Err(AcceptorError::NotConnected);
        }

        let mut bytes = BytesMut::new();
        let mut io = self.io.lock().await;
        io.codec.encode(message, &mut bytes)?;

        if let Err(e) = io.stream.write_all(&bytes).await {
            tracing::warn!(client = self.id, error = %e, "disconnecting client after write failure");
            self.mark_closed();
            let _ = io.stream.shutdown().await;
            return Err(AcceptorError::Io(e));
        }
        Ok(())
    }

    /// Mark the client closed and shut the transport down.
    pub async fn close(&self) {
        self.mark_closed();
        let mut io = self.io.lock().await;
        let _ = io.stream.shutdown().await;
    }
}
