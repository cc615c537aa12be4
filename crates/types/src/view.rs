//! View metadata.

use crate::NodeId;
use serde::{Deserialize, Serialize};

/// Epoch identifier naming the current primary.
///
/// There is no view-change subprotocol: the view a replica boots with is the
/// view it keeps for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub id: i64,
    /// The replica designated to originate pre-prepare messages.
    pub primary: NodeId,
}

impl View {
    pub fn new(id: i64, primary: impl Into<NodeId>) -> Self {
        Self {
            id,
            primary: primary.into(),
        }
    }

    /// Whether `node` is this view's primary.
    pub fn is_primary(&self, node: &NodeId) -> bool {
        self.primary == *node
    }
}
