//! FIFO buffers for messages that arrived before the replica could act.

use pbft_types::{PrePrepareMsg, RequestMsg, VoteMsg};
use std::collections::VecDeque;

/// Four FIFO queues, one per protocol message kind.
///
/// The buffer is pure data: every decision about when to flush lives in the
/// dispatcher.
#[derive(Debug, Default)]
pub struct MsgBuffer {
    requests: VecDeque<RequestMsg>,
    pre_prepares: VecDeque<PrePrepareMsg>,
    prepares: VecDeque<VoteMsg>,
    commits: VecDeque<VoteMsg>,
}

impl MsgBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_request(&mut self, msg: RequestMsg) {
        self.requests.push_back(msg);
    }

    pub fn push_pre_prepare(&mut self, msg: PrePrepareMsg) {
        self.pre_prepares.push_back(msg);
    }

    pub fn push_prepare(&mut self, vote: VoteMsg) {
        self.prepares.push_back(vote);
    }

    pub fn push_commit(&mut self, vote: VoteMsg) {
        self.commits.push_back(vote);
    }

    /// Remove and return every buffered request, oldest first.
    pub fn drain_requests(&mut self) -> Vec<RequestMsg> {
        self.requests.drain(..).collect()
    }

    pub fn drain_pre_prepares(&mut self) -> Vec<PrePrepareMsg> {
        self.pre_prepares.drain(..).collect()
    }

    pub fn drain_prepares(&mut self) -> Vec<VoteMsg> {
        self.prepares.drain(..).collect()
    }

    pub fn drain_commits(&mut self) -> Vec<VoteMsg> {
        self.commits.drain(..).collect()
    }

    /// Remove the oldest buffered request, if any.
    pub fn pop_request(&mut self) -> Option<RequestMsg> {
        self.requests.pop_front()
    }

    /// Remove the oldest buffered pre-prepare, if any.
    pub fn pop_pre_prepare(&mut self) -> Option<PrePrepareMsg> {
        self.pre_prepares.pop_front()
    }

    pub fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    pub fn has_pre_prepares(&self) -> bool {
        !self.pre_prepares.is_empty()
    }

    pub fn has_prepares(&self) -> bool {
        !self.prepares.is_empty()
    }

    pub fn has_commits(&self) -> bool {
        !self.commits.is_empty()
    }
}
