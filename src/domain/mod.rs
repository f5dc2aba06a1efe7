//! Tool definitions, their schemas, and the registry that holds them
//!
//! Everything here is transport-agnostic: both the stateless `/mcp` shim and the
//! session-bearing `/mcp-stream` surface read from the same registry.

pub mod registry;
pub mod schema;
pub mod tools;
pub mod zodiac;
