//! Outbound delivery seam.
//!
//! The runner hands every outbound message to a [`Transport`]. Production
//! uses [`HttpTransport`] (one JSON POST per peer); tests substitute an
//! in-memory implementation.

use crate::event::Outbound;
use crate::peers::PeerTable;
use async_trait::async_trait;
use pbft_types::{NodeId, VoteKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Fire-and-forget delivery to one peer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver one message. Implementations log failures and never surface
    /// them to the caller: a dead peer must not stall the protocol.
    async fn send(&self, peer: &NodeId, message: Outbound);
}

/// Timeout applied to each outbound POST.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP transport: each message becomes a JSON POST to the peer's endpoint
/// for that message kind.
pub struct HttpTransport {
    peers: Arc<PeerTable>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(peers: Arc<PeerTable>) -> Self {
        Self {
            peers,
            client: reqwest::Client::new(),
        }
    }
}

/// Endpoint path for an outbound message.
fn path_for(message: &Outbound) -> &'static str {
    match message {
        Outbound::PrePrepare(_) => "/preprepare",
        Outbound::Vote(vote) => match vote.kind {
            VoteKind::Prepare => "/prepare",
            VoteKind::Commit => "/commit",
        },
        Outbound::Reply(_) => "/reply",
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, peer: &NodeId, message: Outbound) {
        let Some(addr) = self.peers.address(peer) else {
            warn!(peer = %peer, "unknown peer, message dropped");
            return;
        };

        let body = match &message {
            Outbound::PrePrepare(msg) => serde_json::to_value(msg),
            Outbound::Vote(vote) => serde_json::to_value(vote),
            Outbound::Reply(reply) => serde_json::to_value(reply),
        };
        let body = match body {
            Ok(body) => body,
            Err(err) => {
                warn!(peer = %peer, error = %err, "outbound serialization failed");
                return;
            }
        };

        let url = format!("http://{}{}", addr, path_for(&message));
        let request = self.client.post(&url).timeout(REQUEST_TIMEOUT).json(&body);
        let peer = peer.clone();

        // Fire and forget: the POST proceeds concurrently with the event
        // loop, and a failure is a per-peer log line, nothing more.
        tokio::spawn(async move {
            if let Err(err) = request.send().await {
                warn!(peer = %peer, url = %url, error = %err, "outbound post failed");
            }
        });
    }
}
