//! Connection acceptance, owner assignment, and the polling dispatch loop.
//!
//! A [`ClientAcceptor`] owns the client registry and the owner queue. Two
//! activities drive it: an accept loop blocked on the listener, and a poll
//! loop that services every registered client on a fixed interval. Both
//! structures sit behind mutexes and the poll pass iterates a snapshot, so
//! accepting and polling never race.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Buf;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Decoder;

use crate::client::{Client, ClientIo, ClientState};
use crate::message::Message;
use crate::owner::{ClientOwner, OwnerQueue};
use crate::websocket::{FrameError, handshake};

/// Pause between poll passes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Callback invoked when a connection arrives and no owner is waiting.
///
/// The returned owner is enqueued by the acceptor and assignment is retried
/// exactly once. A factory may instead enqueue owners itself through
/// [`ClientAcceptor::enqueue_owner`] and return `None`; the retry picks them
/// up the same way.
pub type OwnerFactory = Box<dyn Fn() -> Option<Arc<dyn ClientOwner>> + Send + Sync>;

/// Errors surfaced by the acceptor and the client send path.
#[derive(Debug)]
pub enum AcceptorError {
    /// The client has not completed its handshake, or is already closed
    NotConnected,
    /// Handshake or framing failure
    Frame(FrameError),
    /// Transport I/O failure; the affected client has been closed
    Io(std::io::Error),
}

impl fmt::Display for AcceptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptorError::NotConnected => write!(f, "Client is not connected"),
            AcceptorError::Frame(e) => write!(f, "WebSocket error: {}", e),
            AcceptorError::Io(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for AcceptorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AcceptorError::NotConnected => None,
            AcceptorError::Frame(e) => Some(e),
            AcceptorError::Io(e) => Some(e),
        }
    }
}

impl From<FrameError> for AcceptorError {
    fn from(err: FrameError) -> Self {
        AcceptorError::Frame(err)
    }
}

impl From<std::io::Error> for AcceptorError {
    fn from(err: std::io::Error) -> Self {
        AcceptorError::Io(err)
    }
}

/// Accepts connections, matches them against waiting owners, and drives the
/// read/dispatch loop.
pub struct ClientAcceptor {
    clients: Mutex<Vec<Arc<Client>>>,
    accept_queue: Mutex<OwnerQueue>,
    owner_factory: OwnerFactory,
    next_id: AtomicU64,
}

impl ClientAcceptor {
    /// Create an acceptor with the given owner factory.
    pub fn new(owner_factory: OwnerFactory) -> Self {
        ClientAcceptor {
            clients: Mutex::new(Vec::new()),
            accept_queue: Mutex::new(OwnerQueue::new()),
            owner_factory,
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue an owner to receive a future client.
    pub fn enqueue_owner(&self, owner: Arc<dyn ClientOwner>) {
        self.accept_queue
            .lock()
            .expect("owner queue lock poisoned")
            .enqueue(owner);
    }

    /// Number of currently registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("client registry lock poisoned").len()
    }

    /// Number of owners waiting for a client.
    pub fn waiting_owners(&self) -> usize {
        self.accept_queue
            .lock()
            .expect("owner queue lock poisoned")
            .len()
    }

    /// Register an accepted transport and assign it an owner.
    ///
    /// The oldest waiting owner receives the client; an owner that reports
    /// it is full afterwards leaves the queue. With no owner waiting, the
    /// factory is asked once; if the queue is still empty after that, the
    /// client stays registered but unassigned.
    pub fn add_client(&self, stream: TcpStream) -> Arc<Client> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(id, stream));
        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .push(Arc::clone(&client));
        tracing::info!(client = id, peer = ?client.peer_addr(), "registered client");

        self.assign_owner(&client);
        client
    }

    fn assign_owner(&self, client: &Arc<Client>) {
        // The factory and the owner callbacks run outside the queue lock;
        // either may call enqueue_owner.
        let mut next = self.queue_head();
        if next.is_none() {
            if let Some(owner) = (self.owner_factory)() {
                self.enqueue_owner(owner);
            }
            next = self.queue_head();
        }

        match next {
            Some(owner) => {
                client.bind_owner(&owner);
                owner.adopt(client);
                self.accept_queue
                    .lock()
                    .expect("owner queue lock poisoned")
                    .remove_if_full(&owner);
                tracing::debug!(client = client.id(), "client handed to owner");
            }
            None => {
                tracing::warn!(
                    client = client.id(),
                    "no owner available; client left unassigned"
                );
            }
        }
    }

    fn queue_head(&self) -> Option<Arc<dyn ClientOwner>> {
        self.accept_queue
            .lock()
            .expect("owner queue lock poisoned")
            .take_next()
    }

    /// Accept transport connections forever, feeding each one to
    /// [`add_client`](Self::add_client). Accept failures are logged and the
    /// loop continues.
    pub async fn accept_loop(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::info!(%addr, "accepted connection");
                    self.add_client(stream);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    /// Service every registered client on a fixed interval, forever.
    pub async fn poll_loop(&self) {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }

    /// Spawn the accept loop as its own task and drive the poll loop on the
    /// calling task. Neither returns; both run for the life of the process.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let acceptor = Arc::clone(&self);
        tokio::spawn(async move { acceptor.accept_loop(listener).await });
        self.poll_loop().await;
    }

    /// One poll pass: read available bytes from every still-open client, in
    /// registration order, completing handshakes and dispatching decoded
    /// messages to bound owners. Closed clients are swept from the registry
    /// at the end of the pass.
    pub async fn poll_once(&self) {
        let snapshot: Vec<Arc<Client>> = self
            .clients
            .lock()
            .expect("client registry lock poisoned")
            .clone();

        for client in snapshot {
            if client.is_closed() {
                continue;
            }
            let messages = self.service_transport(&client).await;
            if messages.is_empty() {
                continue;
            }
            match client.owner() {
                Some(owner) => {
                    for message in messages {
                        owner.handle_message(&client, message);
                    }
                }
                None => {
                    tracing::debug!(
                        client = client.id(),
                        "dropping messages for unassigned client"
                    );
                }
            }
        }

        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .retain(|client| !client.is_closed());
    }

    /// Drain the transport without blocking and advance the client's
    /// protocol state, returning any decoded messages. Transport and
    /// protocol failures close the client here; only this client is
    /// affected.
    async fn service_transport(&self, client: &Arc<Client>) -> Vec<Message> {
        let mut guard = client.io.lock().await;
        let io: &mut ClientIo = &mut guard;

        let mut chunk = [0u8; 4096];
        loop {
            match io.stream.try_read(&mut chunk) {
                Ok(0) => {
                    tracing::info!(client = client.id(), "peer disconnected");
                    client.mark_closed();
                    return Vec::new();
                }
                Ok(n) => io.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(client = client.id(), error = %e, "read failure; disconnecting client");
                    client.mark_closed();
                    return Vec::new();
                }
            }
        }

        // Not enough data for anything yet; retry on a later pass.
        if io.buffer.len() < 3 {
            return Vec::new();
        }

        if !client.is_connected() {
            match Self::try_handshake(client, io).await {
                Ok(true) => {}
                Ok(false) => return Vec::new(),
                Err(e) => {
                    tracing::warn!(client = client.id(), error = %e, "handshake failed; disconnecting client");
                    client.mark_closed();
                    let _ = io.stream.shutdown().await;
                    return Vec::new();
                }
            }
        }

        let mut messages = Vec::new();
        loop {
            match io.codec.decode(&mut io.buffer) {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(client = client.id(), error = %e, "protocol error; disconnecting client");
                    client.mark_closed();
                    let _ = io.stream.shutdown().await;
                    return Vec::new();
                }
            }
        }
        messages
    }

    /// Complete the upgrade once the full request head is buffered. Returns
    /// `Ok(false)` while the request is still arriving.
    async fn try_handshake(client: &Arc<Client>, io: &mut ClientIo) -> Result<bool, FrameError> {
        // Bytes that do not open like an HTTP request will never grow a
        // blank line; reject them now instead of buffering forever.
        if !handshake::is_upgrade_request(&io.buffer) {
            return Err(FrameError::BadHandshake("not a GET request".into()));
        }

        let Some(end) = handshake::request_end(&io.buffer) else {
            client.set_state(ClientState::HandshakePending);
            return Ok(false);
        };

        let response = handshake::upgrade_response(&io.buffer[..end])?;
        io.buffer.advance(end);
        io.stream.write_all(&response).await?;
        client.set_state(ClientState::Connected);
        tracing::info!(client = client.id(), "handshake complete");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::Frame;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    struct TestOwner {
        capacity: AtomicUsize,
        adopted: StdMutex<Vec<u64>>,
        messages: StdMutex<Vec<(u64, Message)>>,
    }

    impl TestOwner {
        fn with_capacity(n: usize) -> Arc<Self> {
            Arc::new(TestOwner {
                capacity: AtomicUsize::new(n),
                adopted: StdMutex::new(Vec::new()),
                messages: StdMutex::new(Vec::new()),
            })
        }

        fn adopted_ids(&self) -> Vec<u64> {
            self.adopted.lock().unwrap().clone()
        }

        fn message_count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }
    }

    impl ClientOwner for TestOwner {
        fn can_accept(&self) -> bool {
            self.capacity.load(Ordering::SeqCst) > 0
        }

        fn adopt(&self, client: &Arc<Client>) {
            self.capacity.fetch_sub(1, Ordering::SeqCst);
            self.adopted.lock().unwrap().push(client.id());
        }

        fn handle_message(&self, client: &Arc<Client>, message: Message) {
            self.messages.lock().unwrap().push((client.id(), message));
        }
    }

    fn no_factory() -> OwnerFactory {
        Box::new(|| None)
    }

    async fn connect_pair(acceptor: &ClientAcceptor) -> (TcpStream, Arc<Client>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (peer, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let client = acceptor.add_client(accepted.unwrap().0);
        (peer.unwrap(), client)
    }

    fn upgrade_request() -> Vec<u8> {
        format!(
            "GET /game HTTP/1.1\r\n\
             Host: localhost\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {SAMPLE_KEY}\r\n\r\n"
        )
        .into_bytes()
    }

    fn masked_text(payload: &[u8]) -> Vec<u8> {
        let mut frame = Frame::text(payload.to_vec());
        frame.masked = true;
        frame.encode(Some([0x37, 0xFA, 0x21, 0x3D])).unwrap()
    }

    /// Run poll passes until `done` holds or the attempt budget runs out.
    async fn pump(acceptor: &ClientAcceptor, done: impl Fn() -> bool) {
        for _ in 0..200 {
            acceptor.poll_once().await;
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("poll passes exhausted before the expected state was reached");
    }

    async fn handshaken_pair(acceptor: &ClientAcceptor) -> (TcpStream, Arc<Client>) {
        let (mut peer, client) = connect_pair(acceptor).await;
        peer.write_all(&upgrade_request()).await.unwrap();
        {
            let client = Arc::clone(&client);
            pump(acceptor, move || client.is_connected()).await;
        }
        let mut response = vec![0u8; 256];
        let n = peer.read(&mut response).await.unwrap();
        assert!(
            String::from_utf8_lossy(&response[..n]).contains(SAMPLE_ACCEPT),
            "handshake response missing accept key"
        );
        (peer, client)
    }

    #[tokio::test]
    async fn handshake_produces_switching_protocols_response() {
        let acceptor = ClientAcceptor::new(no_factory());
        acceptor.enqueue_owner(TestOwner::with_capacity(1));

        let (mut peer, client) = connect_pair(&acceptor).await;
        peer.write_all(&upgrade_request()).await.unwrap();
        {
            let client = Arc::clone(&client);
            pump(&acceptor, move || client.is_connected()).await;
        }

        let mut response = vec![0u8; 256];
        let n = peer.read(&mut response).await.unwrap();
        let text = String::from_utf8_lossy(&response[..n]);
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains(&format!("Sec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n")));
    }

    #[tokio::test]
    async fn decoded_message_reaches_the_bound_owner() {
        let acceptor = ClientAcceptor::new(no_factory());
        let owner = TestOwner::with_capacity(1);
        acceptor.enqueue_owner(owner.clone());

        let (mut peer, client) = handshaken_pair(&acceptor).await;
        peer.write_all(&masked_text(b"move left")).await.unwrap();

        {
            let owner = Arc::clone(&owner);
            pump(&acceptor, move || owner.message_count() > 0).await;
        }

        let messages = owner.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, client.id());
        assert_eq!(messages[0].1.as_text(), Some("move left"));
    }

    #[tokio::test]
    async fn owners_are_assigned_in_fifo_order() {
        let acceptor = ClientAcceptor::new(no_factory());
        let first = TestOwner::with_capacity(1);
        let second = TestOwner::with_capacity(1);
        let third = TestOwner::with_capacity(1);
        acceptor.enqueue_owner(first.clone());
        acceptor.enqueue_owner(second.clone());
        acceptor.enqueue_owner(third.clone());

        let (_peer_a, a) = connect_pair(&acceptor).await;
        let (_peer_b, b) = connect_pair(&acceptor).await;
        let (_peer_c, c) = connect_pair(&acceptor).await;

        assert_eq!(first.adopted_ids(), vec![a.id()]);
        assert_eq!(second.adopted_ids(), vec![b.id()]);
        assert_eq!(third.adopted_ids(), vec![c.id()]);
        // Every owner filled up and left the queue.
        assert_eq!(acceptor.waiting_owners(), 0);
    }

    #[tokio::test]
    async fn full_owner_is_not_offered_further_clients() {
        let acceptor = ClientAcceptor::new(Box::new(|| {
            Some(TestOwner::with_capacity(1) as Arc<dyn ClientOwner>)
        }));
        let owner = TestOwner::with_capacity(1);
        acceptor.enqueue_owner(owner.clone());

        let (_peer_a, _a) = connect_pair(&acceptor).await;
        let (_peer_b, b) = connect_pair(&acceptor).await;

        // The second connection went to a factory-made owner, not back to
        // the exhausted one.
        assert_eq!(owner.adopted_ids().len(), 1);
        assert!(b.owner().is_some());
    }

    #[tokio::test]
    async fn owner_with_spare_capacity_stays_queued() {
        let acceptor = ClientAcceptor::new(no_factory());
        let owner = TestOwner::with_capacity(2);
        acceptor.enqueue_owner(owner.clone());

        let (_peer_a, a) = connect_pair(&acceptor).await;
        assert_eq!(acceptor.waiting_owners(), 1);

        let (_peer_b, b) = connect_pair(&acceptor).await;
        assert_eq!(owner.adopted_ids(), vec![a.id(), b.id()]);
        assert_eq!(acceptor.waiting_owners(), 0);
    }

    #[tokio::test]
    async fn factory_made_owner_outlives_the_queue() {
        // Nothing outside the acceptor retains factory-made owners; the
        // client binding must keep them alive once the queue lets go.
        let created: Arc<StdMutex<Vec<std::sync::Weak<TestOwner>>>> = Default::default();
        let created_in_factory = Arc::clone(&created);
        let acceptor = ClientAcceptor::new(Box::new(move || {
            let owner = TestOwner::with_capacity(1);
            created_in_factory
                .lock()
                .unwrap()
                .push(Arc::downgrade(&owner));
            Some(owner as Arc<dyn ClientOwner>)
        }));

        let (mut peer, client) = handshaken_pair(&acceptor).await;
        // The capacity-1 owner already left the queue.
        assert_eq!(acceptor.waiting_owners(), 0);
        assert!(client.owner().is_some());

        peer.write_all(&masked_text(b"still routed")).await.unwrap();
        let owner = created.lock().unwrap()[0]
            .upgrade()
            .expect("factory-made owner was dropped while its client lives");
        {
            let owner = Arc::clone(&owner);
            pump(&acceptor, move || owner.message_count() > 0).await;
        }
        assert_eq!(
            owner.messages.lock().unwrap()[0].1.as_text(),
            Some("still routed")
        );
    }

    #[tokio::test]
    async fn client_without_owner_stays_registered() {
        let acceptor = ClientAcceptor::new(no_factory());
        let (_peer, client) = connect_pair(&acceptor).await;

        assert!(client.owner().is_none());
        assert_eq!(acceptor.client_count(), 1);
    }

    #[tokio::test]
    async fn short_reads_defer_without_error() {
        let acceptor = ClientAcceptor::new(no_factory());
        let owner = TestOwner::with_capacity(1);
        acceptor.enqueue_owner(owner.clone());

        let (mut peer, client) = handshaken_pair(&acceptor).await;
        let frame = masked_text(b"later on");

        // Two bytes is below the decode threshold; nothing may happen.
        peer.write_all(&frame[..2]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..5 {
            acceptor.poll_once().await;
        }
        assert_eq!(owner.message_count(), 0);
        assert!(client.is_connected());

        peer.write_all(&frame[2..]).await.unwrap();
        {
            let owner = Arc::clone(&owner);
            pump(&acceptor, move || owner.message_count() > 0).await;
        }
        assert_eq!(
            owner.messages.lock().unwrap()[0].1.as_text(),
            Some("later on")
        );
    }

    #[tokio::test]
    async fn bad_handshake_closes_only_that_client() {
        let acceptor = ClientAcceptor::new(no_factory());
        acceptor.enqueue_owner(TestOwner::with_capacity(2));

        let (mut bad_peer, bad) = connect_pair(&acceptor).await;
        let (mut good_peer, good) = connect_pair(&acceptor).await;

        bad_peer
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        good_peer.write_all(&upgrade_request()).await.unwrap();

        {
            let bad = Arc::clone(&bad);
            let good = Arc::clone(&good);
            pump(&acceptor, move || bad.is_closed() && good.is_connected()).await;
        }
        // The failed client is swept from the registry.
        assert_eq!(acceptor.client_count(), 1);
    }

    #[tokio::test]
    async fn frame_bytes_before_handshake_are_rejected() {
        let acceptor = ClientAcceptor::new(no_factory());
        acceptor.enqueue_owner(TestOwner::with_capacity(1));

        // A raw frame instead of an upgrade request never contains the
        // header-terminating blank line; it must not park forever.
        let (mut peer, client) = connect_pair(&acceptor).await;
        peer.write_all(&masked_text(b"no handshake")).await.unwrap();

        {
            let client = Arc::clone(&client);
            pump(&acceptor, move || client.is_closed()).await;
        }
        assert_eq!(acceptor.client_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_frame_terminates_the_connection() {
        let acceptor = ClientAcceptor::new(no_factory());
        acceptor.enqueue_owner(TestOwner::with_capacity(1));

        let (mut peer, client) = handshaken_pair(&acceptor).await;
        // 64-bit extended length marker.
        peer.write_all(&[0x81, 127, 0, 0, 0, 0, 0, 0, 0, 1])
            .await
            .unwrap();

        {
            let client = Arc::clone(&client);
            pump(&acceptor, move || client.is_closed()).await;
        }
        assert_eq!(acceptor.client_count(), 0);
    }

    #[tokio::test]
    async fn peer_disconnect_sweeps_the_client() {
        let acceptor = ClientAcceptor::new(no_factory());
        acceptor.enqueue_owner(TestOwner::with_capacity(1));

        let (peer, _client) = handshaken_pair(&acceptor).await;
        drop(peer);

        pump(&acceptor, || acceptor.client_count() == 0).await;
    }

    #[tokio::test]
    async fn write_failure_closes_one_client_and_spares_the_rest() {
        let acceptor = ClientAcceptor::new(no_factory());
        acceptor.enqueue_owner(TestOwner::with_capacity(2));

        let (doomed_peer, doomed) = handshaken_pair(&acceptor).await;
        let (mut healthy_peer, healthy) = handshaken_pair(&acceptor).await;

        drop(doomed_peer);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The first write may land in the socket buffer; keep writing until
        // the dead transport reports the failure.
        let mut failed = false;
        for _ in 0..20 {
            if doomed.send(&Message::text("anyone there?")).await.is_err() {
                failed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(failed, "write to a closed peer never failed");
        assert!(doomed.is_closed());

        // The other client is untouched and still writable.
        assert!(healthy.is_connected());
        healthy.send(&Message::text("still here")).await.unwrap();
        let mut read = [0u8; 32];
        let n = healthy_peer.read(&mut read).await.unwrap();
        assert_eq!(&read[..n], &[0x81, 10, b's', b't', b'i', b'l', b'l', b' ', b'h', b'e', b'r', b'e']);
    }

    #[tokio::test]
    async fn run_serves_a_full_session() {
        struct EchoOwner {
            given: AtomicUsize,
        }

        impl ClientOwner for EchoOwner {
            fn can_accept(&self) -> bool {
                self.given.load(Ordering::SeqCst) == 0
            }

            fn adopt(&self, _client: &Arc<Client>) {
                self.given.fetch_add(1, Ordering::SeqCst);
            }

            fn handle_message(&self, client: &Arc<Client>, message: Message) {
                let client = Arc::clone(client);
                tokio::spawn(async move {
                    let _ = client.send(&message).await;
                });
            }
        }

        let acceptor = Arc::new(ClientAcceptor::new(Box::new(|| {
            Some(Arc::new(EchoOwner {
                given: AtomicUsize::new(0),
            }) as Arc<dyn ClientOwner>)
        })));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::clone(&acceptor).run(listener));

        let mut peer = TcpStream::connect(addr).await.unwrap();
        peer.write_all(&upgrade_request()).await.unwrap();

        let mut response = vec![0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut response))
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8_lossy(&response[..n]).contains(SAMPLE_ACCEPT));

        peer.write_all(&masked_text(b"echo me")).await.unwrap();
        let mut reply = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&reply[..n], &[0x81, 7, b'e', b'c', b'h', b'o', b' ', b'm', b'e']);
    }
}
