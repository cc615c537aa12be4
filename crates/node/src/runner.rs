//! Tokio event loop driving a replica.
//!
//! One task per node selects between the inbound message stream and a
//! periodic alarm, feeds the synchronous [`Node`], and ships whatever it
//! returns through the [`Transport`]. Single-writer by construction: only
//! this task ever touches the node's state or buffer.

use crate::event::{Delivery, Inbound, Outbound};
use crate::node::Node;
use crate::peers::PeerTable;
use crate::transport::Transport;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Capacity of the inbound channel feeding a node.
const INBOUND_CAPACITY: usize = 1024;

/// Point-in-time snapshot of a replica, published after every batch.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub view_id: i64,
    pub primary: String,
    /// Stage of the in-flight instance, absent between requests.
    pub stage: Option<&'static str>,
    /// Number of committed requests.
    pub committed: usize,
    /// Sequence id of the most recent committed request, `-1` if none.
    pub last_sequence_id: i64,
}

impl NodeStatus {
    fn snapshot(node: &Node) -> Self {
        Self {
            node_id: node.id().to_string(),
            view_id: node.view().id,
            primary: node.view().primary.to_string(),
            stage: node.stage().map(|stage| stage.as_str()),
            committed: node.committed_log().len(),
            last_sequence_id: node.last_sequence_id(),
        }
    }
}

/// Handle to a spawned replica task.
pub struct NodeHandle {
    inbound: mpsc::Sender<Inbound>,
    status: Arc<RwLock<NodeStatus>>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    /// Sender feeding the node's inbound channel.
    pub fn inbound(&self) -> mpsc::Sender<Inbound> {
        self.inbound.clone()
    }

    /// Shared status snapshot, refreshed by the runner.
    pub fn status(&self) -> Arc<RwLock<NodeStatus>> {
        self.status.clone()
    }

    /// Stop the replica task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the replica task to finish.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// The event loop owning one [`Node`].
pub struct NodeRunner {
    node: Node,
    peers: Arc<PeerTable>,
    transport: Arc<dyn Transport>,
    inbound_rx: mpsc::Receiver<Inbound>,
    status: Arc<RwLock<NodeStatus>>,
}

impl NodeRunner {
    /// Spawn the event loop for `node`, returning its handle.
    pub fn spawn(node: Node, peers: Arc<PeerTable>, transport: Arc<dyn Transport>) -> NodeHandle {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let status = Arc::new(RwLock::new(NodeStatus::snapshot(&node)));

        let runner = NodeRunner {
            node,
            peers,
            transport,
            inbound_rx,
            status: status.clone(),
        };
        let task = tokio::spawn(runner.run());

        NodeHandle {
            inbound: inbound_tx,
            status,
            task,
        }
    }

    async fn run(mut self) {
        let period = self.node.config().resolve_interval;
        let mut alarm = time::interval_at(time::Instant::now() + period, period);
        alarm.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                inbound = self.inbound_rx.recv() => match inbound {
                    Some(msg) => {
                        if let Some(batch) = self.node.route(msg) {
                            self.resolve_batch(batch).await;
                        }
                    }
                    None => {
                        debug!(node = %self.node.id(), "inbound channel closed, stopping");
                        break;
                    }
                },
                _ = alarm.tick() => {
                    for batch in self.node.on_alarm() {
                        self.resolve_batch(batch).await;
                    }
                }
            }
            self.publish_status().await;
        }
    }

    async fn resolve_batch(&mut self, batch: Delivery) {
        let now = unix_nanos();
        for outbound in self.node.resolve(batch, now) {
            self.send(outbound).await;
        }
    }

    /// Put one resolver output on the wire: replies go to the primary,
    /// everything else is broadcast to all peers except self.
    async fn send(&self, outbound: Outbound) {
        match &outbound {
            Outbound::Reply(_) => {
                let primary = self.node.view().primary.clone();
                self.transport.send(&primary, outbound).await;
            }
            Outbound::PrePrepare(_) | Outbound::Vote(_) => {
                for peer in self.peers.peers_except(self.node.id()) {
                    self.transport.send(peer, outbound.clone()).await;
                }
            }
        }
    }

    async fn publish_status(&self) {
        *self.status.write().await = NodeStatus::snapshot(&self.node);
    }
}

/// Current wall clock as nanoseconds since the Unix epoch. Readings before
/// the epoch clamp to zero; sequence assignment enforces monotonicity on
/// top of whatever the clock returns.
fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::bootstrap_view;
    use pbft_consensus::ConsensusConfig;
    use pbft_types::{NodeId, RequestMsg};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Transport that records every (peer, message) pair it is handed.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(NodeId, Outbound)>>,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, peer: &NodeId, message: Outbound) {
            self.sent.lock().await.push((peer.clone(), message));
        }
    }

    fn request() -> RequestMsg {
        RequestMsg {
            timestamp: 100,
            client_id: "c1".into(),
            operation: "SET x=1".into(),
            sequence_id: 0,
        }
    }

    #[tokio::test]
    async fn test_runner_broadcasts_pre_prepare_to_all_peers_except_self() {
        let peers = Arc::new(PeerTable::bootstrap());
        let transport = Arc::new(RecordingTransport::default());
        let node = Node::new("Apple", bootstrap_view(), ConsensusConfig::default());

        let handle = NodeRunner::spawn(node, peers, transport.clone());
        handle.inbound().send(Inbound::Request(request())).await.unwrap();

        // Wait for the runner to process and publish.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if handle.status().read().await.stage == Some("pre_prepared") {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "runner did not advance");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let sent = transport.sent.lock().await;
        let recipients: Vec<_> = sent.iter().map(|(peer, _)| peer.as_str()).collect();
        assert_eq!(sent.len(), 3);
        assert!(recipients.contains(&"Ball"));
        assert!(recipients.contains(&"Candy"));
        assert!(recipients.contains(&"Dog"));
        assert!(sent.iter().all(|(_, msg)| matches!(msg, Outbound::PrePrepare(_))));

        handle.abort();
    }

    #[tokio::test]
    async fn test_status_snapshot_tracks_the_node() {
        let peers = Arc::new(PeerTable::bootstrap());
        let transport = Arc::new(RecordingTransport::default());
        let node = Node::new("Ball", bootstrap_view(), ConsensusConfig::default());

        let handle = NodeRunner::spawn(node, peers, transport);
        let status = handle.status().read().await.clone();
        assert_eq!(status.node_id, "Ball");
        assert_eq!(status.primary, "Apple");
        assert_eq!(status.view_id, 10_000_000_000);
        assert_eq!(status.stage, None);
        assert_eq!(status.committed, 0);
        assert_eq!(status.last_sequence_id, -1);

        handle.abort();
    }
}
