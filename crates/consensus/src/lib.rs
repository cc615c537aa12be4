//! PBFT consensus state machine.
//!
//! This crate provides the synchronous state machine that drives a single
//! client request through the three protocol phases:
//!
//! - `start_consensus` → the primary stamps a sequence id and emits a
//!   pre-prepare message
//! - `pre_prepare` → a backup adopts the request, verifies it, and emits a
//!   prepare vote
//! - `prepare` → votes are collected; on quorum the instance emits a commit
//!   vote
//! - `commit` → votes are collected; on quorum the request is executed and
//!   the instance emits a reply
//!
//! All I/O belongs to the node runtime: the state machine takes messages in
//! and hands messages back, never touching a socket or the wall clock. The
//! clock value used for sequence assignment is supplied by the caller, so
//! the machine stays deterministic under test.
//!
//! # Terminology
//!
//! - **Stage**: an instance's position in its lifecycle. Stages only ever
//!   advance: Idle → PrePrepared → Prepared → Committed.
//!
//! - **Quorum**: the number of votes a stage transition requires, counting
//!   votes received from peers only; a replica's own vote never enters its
//!   own log.
//!
//! - **Sequence id**: per-request total-order position assigned by the
//!   primary, strictly increasing within a replica's history.

mod config;
mod state;

pub use config::ConsensusConfig;
pub use state::{ConsensusError, ConsensusState, MsgLogs, Stage};
