//! PBFT replica runtime.
//!
//! This crate wires the consensus state machine into a long-lived process:
//!
//! ```text
//! HTTP endpoints → inbound channel → event loop ─┬→ buffer (too early)
//!                                                └→ resolve → outbound POSTs
//! ```
//!
//! - [`Node`] holds the dispatcher/resolver state and all protocol policy
//! - [`NodeRunner`] is the tokio event loop: it selects between inbound
//!   messages and a periodic alarm, and ships resolver output through the
//!   [`Transport`]
//! - [`rpc`] exposes the five protocol endpoints plus probes
//! - [`HttpTransport`] delivers outbound messages as fire-and-forget JSON
//!   POSTs
//!
//! One task owns each node, so the state machine has a single writer and
//! the buffer a single owner, with no locks around protocol state.

pub mod buffer;
pub mod event;
pub mod node;
pub mod peers;
pub mod rpc;
pub mod runner;
pub mod transport;

pub use buffer::MsgBuffer;
pub use event::{Delivery, Inbound, Outbound};
pub use node::{Node, NodeError};
pub use peers::{bootstrap_view, PeerTable};
pub use runner::{NodeHandle, NodeRunner, NodeStatus};
pub use transport::{HttpTransport, Transport};
