//! HTTP transport layer
//!
//! Maps the routes of the web server onto the dispatcher and the session surface.

pub mod handlers;
