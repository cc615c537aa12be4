//! Tagged message-passing types between transport, dispatcher, and resolver.

use pbft_types::{PrePrepareMsg, ReplyMsg, RequestMsg, VoteMsg};

/// Everything the transport can feed into a replica.
///
/// Each HTTP endpoint decodes into exactly one variant; dispatch is
/// exhaustive matching from there on.
#[derive(Debug, Clone)]
pub enum Inbound {
    Request(RequestMsg),
    PrePrepare(PrePrepareMsg),
    /// Prepare or Commit, discriminated by the vote's `kind`.
    Vote(VoteMsg),
    /// Terminal message arriving at the primary's reply endpoint.
    Reply(ReplyMsg),
}

/// A batch released by the dispatcher for resolution.
///
/// Messages within a batch resolve in FIFO order; ordering across batches
/// is undefined.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Requests(Vec<RequestMsg>),
    PrePrepares(Vec<PrePrepareMsg>),
    Prepares(Vec<VoteMsg>),
    Commits(Vec<VoteMsg>),
}

/// A protocol message the resolver wants on the wire.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Broadcast to every peer except self.
    PrePrepare(PrePrepareMsg),
    /// Broadcast to every peer except self.
    Vote(VoteMsg),
    /// Sent to the primary's reply endpoint.
    Reply(ReplyMsg),
}
