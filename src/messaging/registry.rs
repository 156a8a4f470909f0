//! Address registry.
//!
//! The registry is the only structure every node can reach. It is an
//! explicit value owned by the driver and cloned into every agent, so
//! several independent networks can live in one process. Bindings are
//! append-only: an address is bound once, when its runner is built.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::address::Address;
use crate::error::DcopError;

use super::mailbox::Inbox;
use super::message::Message;

/// Shared address → inbox table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inboxes: Arc<DashMap<Address, Inbox>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `address` to `inbox`. Each address binds exactly once.
    pub fn register(&self, address: Address, inbox: Inbox) -> Result<(), DcopError> {
        use dashmap::mapref::entry::Entry;

        match self.inboxes.entry(address) {
            Entry::Occupied(entry) => Err(DcopError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                log::debug!("[Registry] bound {}", entry.key());
                entry.insert(inbox);
                Ok(())
            }
        }
    }

    /// Whether `address` is bound.
    pub fn contains(&self, address: &Address) -> bool {
        self.inboxes.contains_key(address)
    }

    /// Number of bound addresses.
    pub fn len(&self) -> usize {
        self.inboxes.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.inboxes.is_empty()
    }

    /// Pending count of the inbox bound to `address`.
    pub fn pending(&self, address: &Address) -> Option<usize> {
        self.inboxes.get(address).map(|inbox| inbox.pending())
    }

    /// Whether no bound mailbox holds a queued or in-progress message.
    ///
    /// Compares the accepted totals taken before and after the pending
    /// sweep, so a message hopping between nodes mid-sweep is not missed.
    /// Only meaningful while the caller itself is not sending.
    pub fn is_quiescent(&self) -> bool {
        let accepted = |inboxes: &DashMap<Address, Inbox>| -> u64 {
            inboxes.iter().map(|entry| entry.value().accepted()).sum()
        };
        let before = accepted(&self.inboxes);
        let idle = self.inboxes.iter().all(|entry| entry.value().pending() == 0);
        idle && accepted(&self.inboxes) == before
    }

    /// Wait until [`Registry::is_quiescent`] holds on two consecutive polls.
    pub async fn quiesce(&self, poll: Duration) {
        let mut quiet = 0;
        while quiet < 2 {
            tokio::time::sleep(poll).await;
            quiet = if self.is_quiescent() { quiet + 1 } else { 0 };
        }
    }

    /// Enqueue `message` for `to`.
    ///
    /// An unknown address is logged and reported as `false`; it is never an
    /// error for the sender, since a neighbour may already be torn down.
    pub fn send(&self, to: &Address, message: Message) -> bool {
        let inbox = match self.inboxes.get(to) {
            Some(entry) => entry.value().clone(),
            None => {
                log::warn!(
                    "[Registry] dropping '{}' for unknown address {}",
                    message.kind(),
                    to
                );
                return false;
            }
        };
        inbox.push(message)
    }

    /// Send a copy of `message` to every address in `targets`.
    ///
    /// Returns how many copies were accepted.
    pub fn broadcast<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a Address>,
        message: &Message,
    ) -> usize {
        targets
            .into_iter()
            .filter(|to| self.send(to, message.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::mailbox::channel;

    #[test]
    fn test_register_binds_once() {
        let registry = Registry::new();
        let a = Address::new("a");
        let (inbox, _mailbox) = channel(&a);
        registry.register(a.clone(), inbox.clone()).unwrap();
        assert!(matches!(
            registry.register(a.clone(), inbox),
            Err(DcopError::AlreadyRegistered(addr)) if addr == a
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_send_to_unknown_is_not_fatal() {
        let registry = Registry::new();
        assert!(!registry.send(&Address::new("ghost"), Message::control("ping")));
    }

    #[test]
    fn test_broadcast_copies_per_target() {
        let registry = Registry::new();
        let (a, b) = (Address::new("a"), Address::new("b"));
        let (ia, mut ma) = channel(&a);
        let (ib, mut mb) = channel(&b);
        registry.register(a.clone(), ia).unwrap();
        registry.register(b.clone(), ib).unwrap();

        let ghost = Address::new("ghost");
        let msg = Message::control("hello");
        assert_eq!(registry.broadcast([&a, &b, &ghost], &msg), 2);
        assert_eq!(ma.try_recv().unwrap().kind(), "hello");
        assert_eq!(mb.try_recv().unwrap().kind(), "hello");
        assert_eq!(registry.pending(&a), Some(0));
        assert_eq!(registry.pending(&ghost), None);
    }

    #[test]
    fn test_quiescence_tracks_in_flight_deliveries() {
        let registry = Registry::new();
        let a = Address::new("a");
        let (inbox, mut mailbox) = channel(&a);
        registry.register(a.clone(), inbox).unwrap();
        assert!(registry.is_quiescent());
        registry.send(&a, Message::control("work"));
        assert!(!registry.is_quiescent());
        let delivery = mailbox.try_recv().unwrap();
        assert!(!registry.is_quiescent());
        drop(delivery);
        assert!(registry.is_quiescent());
    }

    #[test]
    fn test_independent_registries() {
        let first = Registry::new();
        let second = Registry::new();
        let a = Address::new("a");
        let (inbox, _mailbox) = channel(&a);
        first.register(a.clone(), inbox).unwrap();
        assert!(first.contains(&a));
        assert!(!second.contains(&a));
        let shared = first.clone();
        assert!(shared.contains(&a));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_per_sender_under_concurrency() {
        let registry = Registry::new();
        let target = Address::new("target");
        let (inbox, mut mailbox) = channel(&target);
        registry.register(target.clone(), inbox).unwrap();

        let senders: Vec<Address> = (0..4).map(|i| Address::new(format!("s{i}"))).collect();
        let mut handles = Vec::new();
        for sender in senders.clone() {
            let registry = registry.clone();
            let target = target.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..200u32 {
                    let msg = Message::new(&sender, "seq").with("n", &seq).unwrap();
                    assert!(registry.send(&target, msg));
                    if seq % 17 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in futures::future::join_all(handles).await {
            handle.unwrap();
        }

        let mut last: std::collections::HashMap<Address, u32> = Default::default();
        let mut total = 0;
        while let Some(delivery) = mailbox.try_recv() {
            let source = delivery.source().unwrap().clone();
            let n: u32 = delivery.get("n").unwrap();
            if let Some(prev) = last.insert(source, n) {
                assert!(n > prev, "per-sender order violated");
            }
            total += 1;
        }
        assert_eq!(total, 800);
    }
}
