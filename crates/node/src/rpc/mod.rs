//! HTTP endpoints for the replica.
//!
//! Five protocol endpoints (`/req`, `/preprepare`, `/prepare`, `/commit`,
//! `/reply`) that decode a JSON body, enqueue it on the node's inbound
//! channel, and return immediately, plus a liveness probe and a status
//! snapshot.

mod routes;
mod server;

pub use routes::{create_router, RpcState};
pub use server::{RpcServer, RpcServerConfig, RpcServerError, RpcServerHandle};
