//! RPC Server - HTTP JSON-RPC surface for the preconfirmation node
//!
//! Exposes the tentative head (with its trust status), the lookahead, and
//! recorded fault evidence, and accepts signed commitments for the
//! application queue.

pub mod http_server;
pub mod methods;

pub use http_server::HttpRpcServer;
pub use methods::RpcContext;
