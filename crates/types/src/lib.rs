//! Core types for the PBFT replica.
//!
//! This crate provides the foundational types used throughout the replica:
//!
//! - **Protocol messages**: [`RequestMsg`], [`PrePrepareMsg`], [`VoteMsg`],
//!   and [`ReplyMsg`], the wire shapes of the three-phase protocol
//! - **Identifiers**: [`NodeId`], [`View`]
//! - **Digest**: the canonical request hash binding the protocol phases to
//!   one request
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer. Every wire
//! type serializes with serde so that the HTTP transport and the digest see
//! the same canonical encoding.

mod digest;
mod messages;
mod view;

pub use digest::{digest, DigestError};
pub use messages::{NodeId, PrePrepareMsg, ReplyMsg, RequestMsg, VoteKind, VoteMsg};
pub use view::View;
