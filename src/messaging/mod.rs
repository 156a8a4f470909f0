//! Addressing and messaging substrate.
//!
//! Every node owns a FIFO [`Mailbox`]; its sending half, the [`Inbox`], is
//! bound in a shared [`Registry`] under the node's address. Sending is
//! fire-and-forget: the registry resolves the address and enqueues a copy of
//! the message. Ordering is FIFO per (sender, receiver) pair only.

pub mod mailbox;
pub mod message;
pub mod registry;

pub use mailbox::{channel, Delivery, Inbox, Mailbox};
pub use message::{Message, Payload};
pub use registry::Registry;
