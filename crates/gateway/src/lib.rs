//! SerialAgent gateway: HTTP/WebSocket surface, agent loop runtime, and CLI.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
