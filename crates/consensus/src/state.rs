//! Per-instance consensus state machine.

use crate::ConsensusConfig;
use pbft_types::{
    digest, DigestError, NodeId, PrePrepareMsg, ReplyMsg, RequestMsg, VoteKind, VoteMsg,
};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Position of a consensus instance in its lifecycle.
///
/// Stages only ever advance, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// The instance exists but no request has been accepted yet.
    Idle,
    /// A request is logged; the replica is collecting prepare votes.
    PrePrepared,
    /// Prepare quorum reached; the replica is collecting commit votes.
    Prepared,
    /// Commit quorum reached; the request was executed and a reply emitted.
    Committed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::PrePrepared => "pre_prepared",
            Stage::Prepared => "prepared",
            Stage::Committed => "committed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a consensus instance has accepted so far.
#[derive(Debug, Clone, Default)]
pub struct MsgLogs {
    /// The request under agreement. Set once, at the transition out of
    /// Idle, and never cleared during the instance.
    pub request: Option<RequestMsg>,
    /// Prepare votes keyed by voter. A voter's later vote replaces its
    /// earlier one.
    pub prepare_votes: HashMap<NodeId, VoteMsg>,
    /// Commit votes keyed by voter.
    pub commit_votes: HashMap<NodeId, VoteMsg>,
}

/// Errors from the consensus state machine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// View mismatch, stale sequence id, or digest mismatch. The offending
    /// message is dropped; the stage does not change.
    #[error("corrupt message: {0}")]
    CorruptMessage(String),
    /// Canonical serialization failed while computing a digest. The current
    /// operation is aborted; the state is unchanged.
    #[error(transparent)]
    Digest(#[from] DigestError),
}

/// State machine for one consensus instance.
///
/// Owned exclusively by its node; the node feeds it one message at a time
/// and broadcasts whatever it returns. Votes returned by [`pre_prepare`]
/// and [`prepare`], and replies returned by [`commit`], carry an empty
/// voter id; the node stamps its own before broadcast.
///
/// [`pre_prepare`]: ConsensusState::pre_prepare
/// [`prepare`]: ConsensusState::prepare
/// [`commit`]: ConsensusState::commit
#[derive(Debug)]
pub struct ConsensusState {
    /// The view this instance runs in; constant for its lifetime.
    view_id: i64,
    /// Sequence id of the most recently committed request, `-1` if none.
    last_sequence_id: i64,
    stage: Stage,
    logs: MsgLogs,
    config: ConsensusConfig,
}

impl ConsensusState {
    pub fn new(view_id: i64, last_sequence_id: i64, config: ConsensusConfig) -> Self {
        Self {
            view_id,
            last_sequence_id,
            stage: Stage::Idle,
            logs: MsgLogs::default(),
            config,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn view_id(&self) -> i64 {
        self.view_id
    }

    pub fn last_sequence_id(&self) -> i64 {
        self.last_sequence_id
    }

    pub fn logs(&self) -> &MsgLogs {
        &self.logs
    }

    /// Begin consensus on a client request (primary only, from Idle).
    ///
    /// Assigns the next sequence id from the supplied clock reading, clamped
    /// so it stays strictly above `last_sequence_id` even when the clock has
    /// not advanced, logs the stamped request, and moves to PrePrepared.
    /// Returns the pre-prepare message to broadcast.
    pub fn start_consensus(
        &mut self,
        mut request: RequestMsg,
        now_nanos: i64,
    ) -> Result<PrePrepareMsg, ConsensusError> {
        let mut sequence_id = now_nanos;
        if sequence_id <= self.last_sequence_id {
            sequence_id = self.last_sequence_id + 1;
        }
        request.sequence_id = sequence_id;

        let digest = digest(&request)?;
        self.logs.request = Some(request.clone());
        self.stage = Stage::PrePrepared;

        debug!(
            view_id = self.view_id,
            sequence_id,
            client = %request.client_id,
            "consensus started"
        );

        Ok(PrePrepareMsg {
            view_id: self.view_id,
            sequence_id,
            digest,
            request,
        })
    }

    /// Accept a pre-prepare from the primary (backups only, from Idle).
    ///
    /// Adopts the carried request, verifies the message against it, and
    /// moves to PrePrepared. Returns the prepare vote to broadcast.
    pub fn pre_prepare(&mut self, msg: PrePrepareMsg) -> Result<VoteMsg, ConsensusError> {
        self.logs.request = Some(msg.request);
        self.verify(msg.view_id, msg.sequence_id, &msg.digest)?;
        self.stage = Stage::PrePrepared;

        debug!(
            view_id = self.view_id,
            sequence_id = msg.sequence_id,
            "pre-prepare accepted"
        );

        Ok(VoteMsg {
            view_id: self.view_id,
            sequence_id: msg.sequence_id,
            digest: msg.digest,
            node_id: NodeId::default(),
            kind: VoteKind::Prepare,
        })
    }

    /// Record a prepare vote.
    ///
    /// On quorum, moves to Prepared and returns the commit vote to
    /// broadcast. The transition is one-shot: later prepare votes are still
    /// recorded but produce no further message.
    pub fn prepare(&mut self, vote: VoteMsg) -> Result<Option<VoteMsg>, ConsensusError> {
        self.verify(vote.view_id, vote.sequence_id, &vote.digest)?;

        let sequence_id = vote.sequence_id;
        let digest = vote.digest.clone();
        self.logs.prepare_votes.insert(vote.node_id.clone(), vote);

        if self.stage == Stage::PrePrepared && self.prepared() {
            self.stage = Stage::Prepared;
            debug!(view_id = self.view_id, sequence_id, "prepare quorum reached");
            return Ok(Some(VoteMsg {
                view_id: self.view_id,
                sequence_id,
                digest,
                node_id: NodeId::default(),
                kind: VoteKind::Commit,
            }));
        }

        Ok(None)
    }

    /// Record a commit vote.
    ///
    /// On quorum, executes the request, moves to Committed, and returns the
    /// reply together with the committed request. One-shot like
    /// [`prepare`](ConsensusState::prepare).
    pub fn commit(
        &mut self,
        vote: VoteMsg,
    ) -> Result<Option<(ReplyMsg, RequestMsg)>, ConsensusError> {
        self.verify(vote.view_id, vote.sequence_id, &vote.digest)?;

        let sequence_id = vote.sequence_id;
        self.logs.commit_votes.insert(vote.node_id.clone(), vote);

        if self.stage == Stage::Prepared && self.committed() {
            let Some(request) = self.logs.request.clone() else {
                // prepared() guarantees a logged request.
                return Ok(None);
            };
            let result = execute(&request);
            self.stage = Stage::Committed;
            debug!(view_id = self.view_id, sequence_id, "commit quorum reached");

            let reply = ReplyMsg {
                view_id: self.view_id,
                timestamp: request.timestamp,
                client_id: request.client_id.clone(),
                node_id: NodeId::default(),
                result,
            };
            return Ok(Some((reply, request)));
        }

        Ok(None)
    }

    /// The prepare-quorum predicate: a request is logged and at least
    /// `quorum` distinct prepare voters are recorded.
    fn prepared(&self) -> bool {
        self.logs.request.is_some() && self.logs.prepare_votes.len() >= self.config.quorum()
    }

    /// The commit-quorum predicate; implies [`prepared`](Self::prepared).
    fn committed(&self) -> bool {
        self.prepared() && self.logs.commit_votes.len() >= self.config.quorum()
    }

    /// Validate an incoming message against this instance.
    fn verify(
        &self,
        view_id: i64,
        sequence_id: i64,
        digest_hex: &str,
    ) -> Result<(), ConsensusError> {
        if view_id != self.view_id {
            return Err(ConsensusError::CorruptMessage(format!(
                "view {view_id} does not match current view {}",
                self.view_id
            )));
        }

        if self.last_sequence_id != -1 && sequence_id <= self.last_sequence_id {
            return Err(ConsensusError::CorruptMessage(format!(
                "sequence {sequence_id} is not newer than {}",
                self.last_sequence_id
            )));
        }

        let request = self.logs.request.as_ref().ok_or_else(|| {
            ConsensusError::CorruptMessage("no request logged for this instance".into())
        })?;
        let expected = digest(request)?;
        if expected != digest_hex {
            return Err(ConsensusError::CorruptMessage(format!(
                "digest {digest_hex} does not match {expected}"
            )));
        }

        Ok(())
    }
}

/// Execute a committed request.
///
/// A real deployment would apply the operation to an application state
/// machine; here execution reduces to a fixed acknowledgement.
fn execute(_request: &RequestMsg) -> String {
    "Executed".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestMsg {
        RequestMsg {
            timestamp: 100,
            client_id: "c1".into(),
            operation: "SET x=1".into(),
            sequence_id: 0,
        }
    }

    fn fresh(last_sequence_id: i64) -> ConsensusState {
        ConsensusState::new(10, last_sequence_id, ConsensusConfig::default())
    }

    /// A backup state that has accepted a pre-prepare, plus the vote
    /// template carrying the matching (view, sequence, digest).
    fn pre_prepared_backup() -> (ConsensusState, VoteMsg) {
        let mut primary = fresh(-1);
        let pre_prepare = primary.start_consensus(request(), 1_000).unwrap();

        let mut backup = fresh(-1);
        let prepare = backup.pre_prepare(pre_prepare).unwrap();
        (backup, prepare)
    }

    fn vote_from(template: &VoteMsg, voter: &str, kind: VoteKind) -> VoteMsg {
        VoteMsg {
            kind,
            ..template.clone()
        }
        .with_voter(NodeId::from(voter))
    }

    #[test]
    fn test_start_consensus_stamps_request_and_emits_pre_prepare() {
        let mut state = fresh(-1);
        let msg = state.start_consensus(request(), 1_000).unwrap();

        assert_eq!(msg.view_id, 10);
        assert_eq!(msg.sequence_id, 1_000);
        assert_eq!(msg.request.sequence_id, 1_000);
        assert_eq!(msg.digest, digest(&msg.request).unwrap());
        assert_eq!(state.stage(), Stage::PrePrepared);
        assert_eq!(state.logs().request.as_ref().unwrap().sequence_id, 1_000);
    }

    #[test]
    fn test_sequence_id_stays_monotonic_within_one_clock_tick() {
        // The clock has not advanced past the last committed sequence.
        let mut state = fresh(1_000);
        let msg = state.start_consensus(request(), 1_000).unwrap();
        assert_eq!(msg.sequence_id, 1_001);

        let mut state = fresh(5_000);
        let msg = state.start_consensus(request(), 1_000).unwrap();
        assert_eq!(msg.sequence_id, 5_001);
    }

    #[test]
    fn test_pre_prepare_adopts_request_and_votes_prepare() {
        let mut primary = fresh(-1);
        let pre_prepare = primary.start_consensus(request(), 1_000).unwrap();

        let mut backup = fresh(-1);
        let vote = backup.pre_prepare(pre_prepare.clone()).unwrap();

        assert_eq!(backup.stage(), Stage::PrePrepared);
        assert_eq!(vote.kind, VoteKind::Prepare);
        assert_eq!(vote.view_id, 10);
        assert_eq!(vote.sequence_id, pre_prepare.sequence_id);
        assert_eq!(vote.digest, pre_prepare.digest);
        // Voter identity is left for the node to stamp.
        assert_eq!(vote.node_id, NodeId::default());
    }

    #[test]
    fn test_pre_prepare_rejects_view_mismatch() {
        let mut primary = fresh(-1);
        let mut pre_prepare = primary.start_consensus(request(), 1_000).unwrap();
        pre_prepare.view_id = 11;

        let mut backup = fresh(-1);
        let err = backup.pre_prepare(pre_prepare).unwrap_err();
        assert!(matches!(err, ConsensusError::CorruptMessage(_)));
        assert_eq!(backup.stage(), Stage::Idle);
    }

    #[test]
    fn test_pre_prepare_rejects_stale_sequence() {
        let mut primary = fresh(-1);
        let pre_prepare = primary.start_consensus(request(), 500).unwrap();

        // A replica that has already committed sequence 500.
        let mut backup = fresh(500);
        let err = backup.pre_prepare(pre_prepare).unwrap_err();
        assert!(matches!(err, ConsensusError::CorruptMessage(_)));
        assert_eq!(backup.stage(), Stage::Idle);
    }

    #[test]
    fn test_prepare_rejects_corrupt_digest() {
        let (mut backup, prepare) = pre_prepared_backup();

        let mut corrupt = vote_from(&prepare, "Candy", VoteKind::Prepare);
        corrupt.digest = "deadbeef".into();

        let err = backup.prepare(corrupt).unwrap_err();
        assert!(matches!(err, ConsensusError::CorruptMessage(_)));
        assert!(backup.logs().prepare_votes.is_empty());
        assert_eq!(backup.stage(), Stage::PrePrepared);
    }

    #[test]
    fn test_prepare_below_quorum_logs_without_output() {
        let (mut backup, prepare) = pre_prepared_backup();

        let out = backup
            .prepare(vote_from(&prepare, "Candy", VoteKind::Prepare))
            .unwrap();
        assert!(out.is_none());
        assert_eq!(backup.logs().prepare_votes.len(), 1);
        assert_eq!(backup.stage(), Stage::PrePrepared);
    }

    #[test]
    fn test_prepare_quorum_transitions_and_emits_commit_vote() {
        let (mut backup, prepare) = pre_prepared_backup();

        backup
            .prepare(vote_from(&prepare, "Candy", VoteKind::Prepare))
            .unwrap();
        let commit = backup
            .prepare(vote_from(&prepare, "Dog", VoteKind::Prepare))
            .unwrap()
            .expect("quorum of two should emit a commit vote");

        assert_eq!(backup.stage(), Stage::Prepared);
        assert_eq!(commit.kind, VoteKind::Commit);
        assert_eq!(commit.sequence_id, prepare.sequence_id);
        assert_eq!(commit.digest, prepare.digest);
    }

    #[test]
    fn test_duplicate_prepare_vote_overwrites_without_new_output() {
        let (mut backup, prepare) = pre_prepared_backup();

        backup
            .prepare(vote_from(&prepare, "Candy", VoteKind::Prepare))
            .unwrap();
        backup
            .prepare(vote_from(&prepare, "Dog", VoteKind::Prepare))
            .unwrap()
            .expect("first quorum");

        // A replay from Candy after the transition: recorded, not re-emitted.
        let out = backup
            .prepare(vote_from(&prepare, "Candy", VoteKind::Prepare))
            .unwrap();
        assert!(out.is_none());
        assert_eq!(backup.logs().prepare_votes.len(), 2);
        assert_eq!(backup.stage(), Stage::Prepared);
    }

    #[test]
    fn test_last_vote_from_a_voter_wins() {
        let (mut backup, prepare) = pre_prepared_backup();

        let first = vote_from(&prepare, "Candy", VoteKind::Prepare);
        backup.prepare(first).unwrap();
        let second = vote_from(&prepare, "Candy", VoteKind::Prepare);
        backup.prepare(second.clone()).unwrap();

        assert_eq!(backup.logs().prepare_votes.len(), 1);
        assert_eq!(
            backup.logs().prepare_votes[&NodeId::from("Candy")],
            second
        );
    }

    #[test]
    fn test_commit_before_prepared_only_logs() {
        let (mut backup, prepare) = pre_prepared_backup();

        // Commit votes ahead of the prepare quorum are recorded but cannot
        // transition the stage.
        let out = backup
            .commit(vote_from(&prepare, "Candy", VoteKind::Commit))
            .unwrap();
        assert!(out.is_none());
        let out = backup
            .commit(vote_from(&prepare, "Dog", VoteKind::Commit))
            .unwrap();
        assert!(out.is_none());
        assert_eq!(backup.stage(), Stage::PrePrepared);
        assert_eq!(backup.logs().commit_votes.len(), 2);
    }

    #[test]
    fn test_commit_quorum_executes_and_replies() {
        let (mut backup, prepare) = pre_prepared_backup();

        backup
            .prepare(vote_from(&prepare, "Candy", VoteKind::Prepare))
            .unwrap();
        backup
            .prepare(vote_from(&prepare, "Dog", VoteKind::Prepare))
            .unwrap();

        backup
            .commit(vote_from(&prepare, "Candy", VoteKind::Commit))
            .unwrap();
        let (reply, committed) = backup
            .commit(vote_from(&prepare, "Dog", VoteKind::Commit))
            .unwrap()
            .expect("quorum of two should commit");

        assert_eq!(backup.stage(), Stage::Committed);
        assert_eq!(reply.result, "Executed");
        assert_eq!(reply.view_id, 10);
        assert_eq!(reply.timestamp, 100);
        assert_eq!(reply.client_id, "c1");
        assert_eq!(committed.client_id, "c1");
        assert_eq!(committed.sequence_id, prepare.sequence_id);
    }

    #[test]
    fn test_commit_after_committed_logs_without_new_reply() {
        let (mut backup, prepare) = pre_prepared_backup();

        for voter in ["Candy", "Dog"] {
            backup
                .prepare(vote_from(&prepare, voter, VoteKind::Prepare))
                .unwrap();
            backup
                .commit(vote_from(&prepare, voter, VoteKind::Commit))
                .unwrap();
        }
        assert_eq!(backup.stage(), Stage::Committed);

        let out = backup
            .commit(vote_from(&prepare, "Apple", VoteKind::Commit))
            .unwrap();
        assert!(out.is_none());
        assert_eq!(backup.logs().commit_votes.len(), 3);
    }

    #[test]
    fn test_stages_advance_in_order() {
        assert!(Stage::Idle < Stage::PrePrepared);
        assert!(Stage::PrePrepared < Stage::Prepared);
        assert!(Stage::Prepared < Stage::Committed);
    }
}
