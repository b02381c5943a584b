//! ESP32 Trace MCP Server
//!
//! A Model Context Protocol server that drives application-trace and
//! heap-trace sessions on an ESP32 target through OpenOCD's TCL interface
//! (TCP, default port 6666).

pub mod config;
pub mod error;
pub mod sequencer;
pub mod session;
pub mod tcl;
pub mod tools;
pub mod utils;
pub mod view;

pub use config::{Args, Config};
pub use error::{Result, TraceError};
pub use tools::TraceToolHandler;
