//! Per-node FIFO mailbox.
//!
//! [`channel`] returns the two halves of a node's queue: the cloneable
//! [`Inbox`] that the registry hands to senders, and the [`Mailbox`] that
//! the node's runner consumes. The queue is unbounded, so a send never
//! blocks and never waits on the receiving node.
//!
//! The pending count covers messages that are queued *or* still being
//! handled: each received message is wrapped in a [`Delivery`] guard that
//! decrements the count when dropped.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::address::Address;

use super::message::Message;

#[derive(Debug)]
struct MailboxState {
    address: Address,
    open: RwLock<bool>,
    pending: AtomicUsize,
    accepted: AtomicU64,
}

/// Create a connected inbox/mailbox pair for `address`.
pub fn channel(address: &Address) -> (Inbox, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(MailboxState {
        address: address.clone(),
        open: RwLock::new(true),
        pending: AtomicUsize::new(0),
        accepted: AtomicU64::new(0),
    });
    (
        Inbox {
            tx,
            state: state.clone(),
        },
        Mailbox { rx, state },
    )
}

// ---------------------------------------------------------------------------
// Inbox (sending half)
// ---------------------------------------------------------------------------

/// Sending half of a node's mailbox.
#[derive(Debug, Clone)]
pub struct Inbox {
    tx: mpsc::UnboundedSender<Message>,
    state: Arc<MailboxState>,
}

impl Inbox {
    /// Address this inbox belongs to.
    pub fn address(&self) -> &Address {
        &self.state.address
    }

    /// Enqueue a message. Returns `false` (and logs) if intake is closed or
    /// the receiving half is gone; an accepted message is never dropped.
    pub fn push(&self, message: Message) -> bool {
        let open = self.state.open.read();
        if !*open {
            log::debug!(
                "[Inbox] {} is closed; rejecting '{}'",
                self.state.address,
                message.kind()
            );
            return false;
        }
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.tx.send(message) {
            self.state.pending.fetch_sub(1, Ordering::AcqRel);
            log::warn!(
                "[Inbox] {} has no receiver; rejecting '{}'",
                self.state.address,
                err.0.kind()
            );
            return false;
        }
        self.state.accepted.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Messages queued or currently being handled.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Messages ever accepted; never decreases.
    pub fn accepted(&self) -> u64 {
        self.state.accepted.load(Ordering::Acquire)
    }

    /// Whether intake is open.
    pub fn is_open(&self) -> bool {
        *self.state.open.read()
    }

    /// Stop accepting messages. Once this returns, no push is in flight.
    pub fn close(&self) {
        *self.state.open.write() = false;
    }

    /// Resume accepting messages.
    pub fn open(&self) {
        *self.state.open.write() = true;
    }
}

// ---------------------------------------------------------------------------
// Mailbox (receiving half)
// ---------------------------------------------------------------------------

/// Receiving half of a node's mailbox.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<Message>,
    state: Arc<MailboxState>,
}

impl Mailbox {
    /// Address this mailbox belongs to.
    pub fn address(&self) -> &Address {
        &self.state.address
    }

    /// Wait for the next message. Cancel-safe: dropping the future loses nothing.
    pub async fn recv(&mut self) -> Option<Delivery> {
        let message = self.rx.recv().await?;
        Some(self.deliver(message))
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        let message = self.rx.try_recv().ok()?;
        Some(self.deliver(message))
    }

    /// Discard every queued message, returning how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.try_recv().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Messages queued or currently being handled.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    fn deliver(&self, message: Message) -> Delivery {
        Delivery {
            message,
            state: self.state.clone(),
        }
    }
}

/// A received message; the mailbox counts it as pending until dropped.
#[derive(Debug)]
pub struct Delivery {
    message: Message,
    state: Arc<MailboxState>,
}

impl Delivery {
    /// The delivered message.
    pub fn message(&self) -> &Message {
        &self.message
    }
}

impl Deref for Delivery {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.state.pending.fetch_sub(1, Ordering::AcqRel);
    }
}
