//! JSON-RPC handling shared by both protocol surfaces
//!
//! Provides envelope parsing and formatting, the stateless dispatcher, and the
//! session-bearing MCP adapter built on top of it.

pub mod rpc;
pub mod server;
pub mod session;
