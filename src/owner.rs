//! Client owners and the FIFO queue of owners waiting for a connection.
//!
//! Owners are supplied by the surrounding application; the core only queues
//! them and matches them against incoming connections. An owner sits in the
//! queue exactly as long as its capacity predicate reports it can take
//! another client.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::client::Client;
use crate::message::Message;

/// A consumer that receives decoded messages for the clients assigned to it.
pub trait ClientOwner: Send + Sync {
    /// Whether this owner can accept another client right now.
    fn can_accept(&self) -> bool;

    /// Called once when a client is bound to this owner.
    fn adopt(&self, client: &Arc<Client>);

    /// Called with every decoded text message for a client bound to this
    /// owner.
    fn handle_message(&self, client: &Arc<Client>, message: Message);
}

/// Ordered queue of owners waiting for a client; insertion order is wait
/// order.
#[derive(Default)]
pub struct OwnerQueue {
    waiting: VecDeque<Arc<dyn ClientOwner>>,
}

impl OwnerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        OwnerQueue {
            waiting: VecDeque::new(),
        }
    }

    /// Append an owner to the tail. The owner must currently report
    /// capacity for a client.
    pub fn enqueue(&mut self, owner: Arc<dyn ClientOwner>) {
        debug_assert!(owner.can_accept());
        self.waiting.push_back(owner);
    }

    /// The oldest waiting owner, without removing it. Removal is decided
    /// separately once the post-assignment capacity is known. `None` means
    /// the acceptor should ask its factory for a fresh owner.
    pub fn take_next(&self) -> Option<Arc<dyn ClientOwner>> {
        self.waiting.front().cloned()
    }

    /// Remove the owner from the queue if it can no longer accept a client.
    /// Comparison is by identity, not value.
    pub fn remove_if_full(&mut self, owner: &Arc<dyn ClientOwner>) {
        if !owner.can_accept() {
            self.waiting.retain(|queued| !Arc::ptr_eq(queued, owner));
        }
    }

    /// Number of waiting owners.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    /// Whether no owner is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
