//! MCP tool surface

pub mod trace_tools;
pub mod types;

pub use trace_tools::TraceToolHandler;
