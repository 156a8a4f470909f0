//! Cost-owning nodes of the constraint network.
//!
//! Two kinds of node host a solver:
//!
//! - [`Agent`] owns exactly one [`Variable`](crate::variable::Variable) plus
//!   the constraints attached to it;
//! - [`FunctionNode`] is the Max-Sum pseudo-agent for one constraint. It owns
//!   no variable and exposes no variable accessor at all.
//!
//! The [`Node`] capability is what runners and solvers need from either
//! kind; [`VariableOwner`] is the extra capability only agents have.

pub mod core;
pub mod function_node;

pub use self::core::Agent;
pub use self::function_node::FunctionNode;

use crate::address::Address;
use crate::messaging::{Message, Registry};
use crate::variable::Variable;

/// Capabilities every solver host provides.
pub trait Node: Send + 'static {
    /// Identity of the node.
    fn address(&self) -> &Address;

    /// Registry the node sends through.
    fn registry(&self) -> &Registry;

    /// Addresses this node exchanges messages with, excluding itself.
    fn neighbor_addresses(&self) -> &[Address];

    /// Whether the node has reached a usable state (an agent's variable is set).
    fn is_settled(&self) -> bool;

    /// Return to the post-construction state.
    fn reset(&mut self);

    /// Send `message` to `to`. See [`Registry::send`].
    fn send(&self, to: &Address, message: Message) -> bool {
        self.registry().send(to, message)
    }

    /// Send a copy of `message` to every neighbour.
    fn broadcast(&self, message: &Message) -> usize {
        self.registry().broadcast(self.neighbor_addresses(), message)
    }
}

/// Capability of nodes that own a decision variable.
pub trait VariableOwner: Node {
    /// The owned variable.
    fn variable(&self) -> &Variable;

    /// Mutable access for the owning solver.
    fn variable_mut(&mut self) -> &mut Variable;
}
