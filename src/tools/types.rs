//! Type definitions for esp-trace MCP tools

use schemars::JsonSchema;
use serde::Deserialize;

// ============================================================================
// apptrace_start / apptrace_stop
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AppTraceStartArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AppTraceStopArgs {}

// ============================================================================
// heaptrace_start / heaptrace_stop
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HeapTraceStartArgs {
    /// Address of the breakpoint opening the capture window
    /// (hex string like "0x400d35b4"). Uses config default if omitted.
    #[serde(default)]
    pub start_breakpoint: Option<String>,
    /// Address of the breakpoint closing the capture window.
    /// Uses config default if omitted.
    #[serde(default)]
    pub stop_breakpoint: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HeapTraceStopArgs {}

// ============================================================================
// trace_status / list_trace_archives / heap_trace_log
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TraceStatusArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTraceArchivesArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HeapTraceLogArgs {
    /// Only return the last N log lines (default: all)
    #[serde(default)]
    pub tail: Option<usize>,
}
