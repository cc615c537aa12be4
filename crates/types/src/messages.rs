//! Wire messages of the three-phase protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a replica, as it appears on the wire and in the peer table.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A client request under agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMsg {
    /// Client-side timestamp, echoed back in the reply.
    pub timestamp: i64,
    /// The client that issued the request.
    pub client_id: String,
    /// Opaque operation the replicas agree on.
    pub operation: String,
    /// Total-order position, assigned by the primary at consensus start.
    /// Zero until the primary stamps it.
    #[serde(default)]
    pub sequence_id: i64,
}

/// Phase-one message, emitted by the primary to all backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePrepareMsg {
    pub view_id: i64,
    pub sequence_id: i64,
    /// Canonical digest of `request`; backups recompute and compare.
    pub digest: String,
    pub request: RequestMsg,
}

/// Which stage a vote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Prepare,
    Commit,
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteKind::Prepare => f.write_str("prepare"),
            VoteKind::Commit => f.write_str("commit"),
        }
    }
}

/// A Prepare or Commit vote from one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMsg {
    pub view_id: i64,
    pub sequence_id: i64,
    /// Digest of the request this vote is bound to.
    pub digest: String,
    /// The voter. Left empty by the state machine; the owning node stamps
    /// its own id before broadcast.
    pub node_id: NodeId,
    pub kind: VoteKind,
}

impl VoteMsg {
    /// Stamp the voter identity onto this vote.
    pub fn with_voter(mut self, node_id: NodeId) -> Self {
        self.node_id = node_id;
        self
    }
}

/// Terminal message, sent to the primary once a replica has executed the
/// committed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMsg {
    pub view_id: i64,
    /// The originating request's timestamp.
    pub timestamp: i64,
    pub client_id: String,
    /// The replica reporting execution. Stamped by the owning node.
    pub node_id: NodeId,
    /// Execution outcome.
    pub result: String,
}

impl ReplyMsg {
    /// Stamp the sender identity onto this reply.
    pub fn with_sender(mut self, node_id: NodeId) -> Self {
        self.node_id = node_id;
        self
    }
}
