//! Dispatcher and resolver state for one replica.
//!
//! A [`Node`] holds everything a replica knows: its identity, the view, at
//! most one in-flight consensus instance, the log of committed requests, and
//! the buffer of messages that arrived too early. Three methods carry all
//! protocol policy:
//!
//! - [`route`](Node::route): dispatch-path decision for one inbound message
//! - [`on_alarm`](Node::on_alarm): periodic flush of stage-ready buffers
//! - [`resolve`](Node::resolve): consume a released batch, advance the
//!   state machine, and produce outbound messages
//!
//! The node is synchronous and never touches the network; the runner feeds
//! it and ships whatever it returns.

use crate::buffer::MsgBuffer;
use crate::event::{Delivery, Inbound, Outbound};
use pbft_consensus::{ConsensusConfig, ConsensusError, ConsensusState, Stage};
use pbft_types::{NodeId, PrePrepareMsg, ReplyMsg, RequestMsg, View, VoteKind, VoteMsg};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the replica runtime.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A second consensus instance was asked to start while one is active.
    /// The triggering message is dropped.
    #[error("another consensus instance is already in progress")]
    AnotherConsensusOngoing,
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

/// One replica's dispatcher/resolver state.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    view: View,
    config: ConsensusConfig,
    /// The in-flight instance; `None` whenever the replica is between
    /// requests.
    current_state: Option<ConsensusState>,
    /// Requests that reached Committed, in commit order.
    committed_log: Vec<RequestMsg>,
    buffer: MsgBuffer,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, view: View, config: ConsensusConfig) -> Self {
        Self {
            id: id.into(),
            view,
            config,
            current_state: None,
            committed_log: Vec::new(),
            buffer: MsgBuffer::new(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn is_primary(&self) -> bool {
        self.view.is_primary(&self.id)
    }

    /// Stage of the in-flight instance, `None` between requests.
    pub fn stage(&self) -> Option<Stage> {
        self.current_state.as_ref().map(ConsensusState::stage)
    }

    pub fn committed_log(&self) -> &[RequestMsg] {
        &self.committed_log
    }

    /// Sequence id of the most recently committed request, `-1` if none.
    pub fn last_sequence_id(&self) -> i64 {
        self.committed_log
            .last()
            .map(|request| request.sequence_id)
            .unwrap_or(-1)
    }

    /// Dispatch-path routing for one inbound message.
    ///
    /// A message the replica is ready for joins a released batch: the
    /// matching buffer is drained atomically with the forward and the new
    /// message appended last. Anything else waits in the buffer until the
    /// replica advances.
    pub fn route(&mut self, msg: Inbound) -> Option<Delivery> {
        match msg {
            Inbound::Request(request) => {
                if self.current_state.is_none() {
                    let mut batch = self.buffer.drain_requests();
                    batch.push(request);
                    Some(Delivery::Requests(batch))
                } else {
                    self.buffer.push_request(request);
                    None
                }
            }
            Inbound::PrePrepare(msg) => {
                if self.current_state.is_none() {
                    let mut batch = self.buffer.drain_pre_prepares();
                    batch.push(msg);
                    Some(Delivery::PrePrepares(batch))
                } else {
                    self.buffer.push_pre_prepare(msg);
                    None
                }
            }
            Inbound::Vote(vote) => match vote.kind {
                VoteKind::Prepare => {
                    if self.stage() == Some(Stage::PrePrepared) {
                        let mut batch = self.buffer.drain_prepares();
                        batch.push(vote);
                        Some(Delivery::Prepares(batch))
                    } else {
                        self.buffer.push_prepare(vote);
                        None
                    }
                }
                VoteKind::Commit => {
                    if self.stage() == Some(Stage::Prepared) {
                        let mut batch = self.buffer.drain_commits();
                        batch.push(vote);
                        Some(Delivery::Commits(batch))
                    } else {
                        self.buffer.push_commit(vote);
                        None
                    }
                }
            },
            Inbound::Reply(reply) => {
                info!(
                    node = %self.id,
                    replier = %reply.node_id,
                    client = %reply.client_id,
                    result = %reply.result,
                    "reply received"
                );
                None
            }
        }
    }

    /// Alarm-path routing: drain whichever buffers the current stage is
    /// ready to consume.
    pub fn on_alarm(&mut self) -> Vec<Delivery> {
        let mut batches = Vec::new();
        match self.stage() {
            None => {
                if self.buffer.has_requests() {
                    batches.push(Delivery::Requests(self.buffer.drain_requests()));
                }
                if self.buffer.has_pre_prepares() {
                    batches.push(Delivery::PrePrepares(self.buffer.drain_pre_prepares()));
                }
            }
            Some(Stage::PrePrepared) => {
                if self.buffer.has_prepares() {
                    batches.push(Delivery::Prepares(self.buffer.drain_prepares()));
                }
            }
            Some(Stage::Prepared) => {
                if self.buffer.has_commits() {
                    batches.push(Delivery::Commits(self.buffer.drain_commits()));
                }
            }
            Some(_) => {}
        }
        batches
    }

    /// Consume one batch in FIFO order, advancing the state machine.
    ///
    /// Returns the messages to put on the wire. Per-message failures are
    /// logged and skipped; a bad message never aborts the rest of its batch.
    pub fn resolve(&mut self, delivery: Delivery, now_nanos: i64) -> Vec<Outbound> {
        let mut out = Vec::new();
        match delivery {
            Delivery::Requests(requests) => {
                self.resolve_requests(requests, now_nanos, &mut out)
            }
            Delivery::PrePrepares(msgs) => self.resolve_pre_prepares(msgs, &mut out),
            Delivery::Prepares(votes) => self.resolve_prepares(votes, &mut out),
            Delivery::Commits(votes) => self.resolve_commits(votes, now_nanos, &mut out),
        }
        out
    }

    fn resolve_requests(
        &mut self,
        requests: Vec<RequestMsg>,
        now_nanos: i64,
        out: &mut Vec<Outbound>,
    ) {
        for request in requests {
            match self.start_instance(request, now_nanos) {
                Ok(pre_prepare) => out.push(Outbound::PrePrepare(pre_prepare)),
                Err(err) => warn!(node = %self.id, error = %err, "client request dropped"),
            }
        }
    }

    fn resolve_pre_prepares(&mut self, msgs: Vec<PrePrepareMsg>, out: &mut Vec<Outbound>) {
        for msg in msgs {
            match self.accept_instance(msg) {
                Ok(prepare) => out.push(Outbound::Vote(prepare)),
                Err(err) => warn!(node = %self.id, error = %err, "pre-prepare dropped"),
            }
        }
    }

    fn resolve_prepares(&mut self, votes: Vec<VoteMsg>, out: &mut Vec<Outbound>) {
        for vote in votes {
            let Some(state) = self.current_state.as_mut() else {
                debug!(node = %self.id, "prepare vote ignored: no active instance");
                continue;
            };
            match state.prepare(vote) {
                Ok(Some(commit_vote)) => {
                    out.push(Outbound::Vote(commit_vote.with_voter(self.id.clone())));
                }
                Ok(None) => {}
                Err(err) => warn!(node = %self.id, error = %err, "prepare vote rejected"),
            }
        }
    }

    fn resolve_commits(&mut self, votes: Vec<VoteMsg>, now_nanos: i64, out: &mut Vec<Outbound>) {
        for vote in votes {
            let outcome = match self.current_state.as_mut() {
                Some(state) => state.commit(vote),
                None => {
                    debug!(node = %self.id, "commit vote ignored: no active instance");
                    continue;
                }
            };
            match outcome {
                Ok(Some((reply, request))) => {
                    let reply = reply.with_sender(self.id.clone());
                    self.conclude(reply, request, now_nanos, out);
                }
                Ok(None) => {}
                Err(err) => warn!(node = %self.id, error = %err, "commit vote rejected"),
            }
        }
    }

    /// Start a new instance as primary. The instance is only installed once
    /// `start_consensus` succeeds, so a failed start leaves the replica
    /// ready for the next request.
    fn start_instance(
        &mut self,
        request: RequestMsg,
        now_nanos: i64,
    ) -> Result<PrePrepareMsg, NodeError> {
        if self.current_state.is_some() {
            return Err(NodeError::AnotherConsensusOngoing);
        }
        let mut state =
            ConsensusState::new(self.view.id, self.last_sequence_id(), self.config.clone());
        let pre_prepare = state.start_consensus(request, now_nanos)?;
        self.current_state = Some(state);
        Ok(pre_prepare)
    }

    /// Start a new instance as backup from a pre-prepare. Installed only on
    /// success, like [`start_instance`](Self::start_instance).
    fn accept_instance(&mut self, msg: PrePrepareMsg) -> Result<VoteMsg, NodeError> {
        if self.current_state.is_some() {
            return Err(NodeError::AnotherConsensusOngoing);
        }
        let mut state =
            ConsensusState::new(self.view.id, self.last_sequence_id(), self.config.clone());
        let prepare = state.pre_prepare(msg)?;
        self.current_state = Some(state);
        Ok(prepare.with_voter(self.id.clone()))
    }

    /// Finish the in-flight instance: emit the reply, append to the
    /// committed log, release the state slot, and immediately begin the
    /// next buffered instance if one is waiting.
    fn conclude(
        &mut self,
        reply: ReplyMsg,
        request: RequestMsg,
        now_nanos: i64,
        out: &mut Vec<Outbound>,
    ) {
        info!(
            node = %self.id,
            sequence_id = request.sequence_id,
            client = %request.client_id,
            "request committed"
        );
        out.push(Outbound::Reply(reply));
        self.committed_log.push(request);
        self.current_state = None;

        if self.is_primary() {
            if let Some(next) = self.buffer.pop_request() {
                self.resolve_requests(vec![next], now_nanos, out);
            }
        } else if let Some(next) = self.buffer.pop_pre_prepare() {
            self.resolve_pre_prepares(vec![next], out);
        }
    }
}
