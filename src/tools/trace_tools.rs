//! RMCP 0.3.2 implementation of the esp-trace MCP tools
//!
//! Exposes start/stop/status for the application-trace and heap-trace
//! sessions. Both sessions are singletons: OpenOCD serves one target on one
//! TCL port, so there is nothing to multiplex at this level.

use std::future::Future;
use std::sync::Arc;

use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
};
use tokio::sync::Mutex;
use tracing::info;

use super::types::*;
use crate::config::Config;
use crate::session::heaptrace::HeapTraceParams;
use crate::session::{AppTraceSession, HeapTraceSession, SessionState};
use crate::view::StatusBoard;

fn make_error(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "Idle",
        SessionState::Running => "Running",
        SessionState::Stopping => "Stopping",
    }
}

/// Trace tool handler
#[derive(Clone)]
pub struct TraceToolHandler {
    #[allow(dead_code)]
    tool_router: ToolRouter<TraceToolHandler>,
    config: Arc<Config>,
    board: Arc<StatusBoard>,
    apptrace: Arc<Mutex<AppTraceSession>>,
    heaptrace: Arc<Mutex<HeapTraceSession>>,
}

impl TraceToolHandler {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let board = Arc::new(StatusBoard::new(config.trace_dir()));
        let apptrace = Arc::new(Mutex::new(AppTraceSession::new(
            Arc::clone(&config),
            board.clone(),
        )));
        let heaptrace = Arc::new(Mutex::new(HeapTraceSession::new(
            Arc::clone(&config),
            board.clone(),
        )));
        Self {
            tool_router: Self::tool_router(),
            config,
            board,
            apptrace,
            heaptrace,
        }
    }

    pub fn board(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.board)
    }
}

#[tool_router]
impl TraceToolHandler {
    // =========================================================================
    // Application trace (2 tools)
    // =========================================================================

    #[tool(description = "Start an application trace capture. Output goes to <workspace>/trace; progress is reported via trace_status.")]
    async fn apptrace_start(&self, Parameters(_args): Parameters<AppTraceStartArgs>) -> Result<CallToolResult, McpError> {
        let mut session = self.apptrace.lock().await;
        session.start().await.map_err(|e| make_error(e.to_string()))?;

        info!("apptrace_start accepted");
        Ok(CallToolResult::success(vec![Content::text(format!(
            "App trace started (status poll every {} ms). Use trace_status for progress.",
            self.config.apptrace.status_interval_ms
        ))]))
    }

    #[tool(description = "Stop the running application trace capture")]
    async fn apptrace_stop(&self, Parameters(_args): Parameters<AppTraceStopArgs>) -> Result<CallToolResult, McpError> {
        let mut session = self.apptrace.lock().await;
        session.stop().await.map_err(|e| make_error(e.to_string()))?;

        let snap = self.board.snapshot();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "App trace stop issued. Status: {}",
            if snap.app_description.is_empty() { "stopping" } else { snap.app_description.as_str() }
        ))]))
    }

    // =========================================================================
    // Heap trace (2 tools)
    // =========================================================================

    #[tool(description = "Start a heap trace capture between two code breakpoints (sysview format)")]
    async fn heaptrace_start(&self, Parameters(args): Parameters<HeapTraceStartArgs>) -> Result<CallToolResult, McpError> {
        let params = HeapTraceParams {
            start_breakpoint: args.start_breakpoint,
            stop_breakpoint: args.stop_breakpoint,
        };
        let mut session = self.heaptrace.lock().await;
        session.start(params).await.map_err(|e| make_error(e.to_string()))?;

        info!("heaptrace_start accepted");
        Ok(CallToolResult::success(vec![Content::text(
            "Heap trace procedure started. Use heap_trace_log to follow it.".to_string(),
        )]))
    }

    #[tool(description = "Abort the heap trace procedure immediately, regardless of remaining steps")]
    async fn heaptrace_stop(&self, Parameters(_args): Parameters<HeapTraceStopArgs>) -> Result<CallToolResult, McpError> {
        let mut session = self.heaptrace.lock().await;
        session.stop().await.map_err(|e| make_error(e.to_string()))?;

        Ok(CallToolResult::success(vec![Content::text(
            "Heap trace stopped".to_string(),
        )]))
    }

    // =========================================================================
    // Status / results (3 tools)
    // =========================================================================

    #[tool(description = "Get the state and progress of both trace sessions")]
    async fn trace_status(&self, Parameters(_args): Parameters<TraceStatusArgs>) -> Result<CallToolResult, McpError> {
        let app_state = self.apptrace.lock().await.state();
        let heap_state = self.heaptrace.lock().await.state();
        let snap = self.board.snapshot();

        let payload = serde_json::json!({
            "apptrace": {
                "state": state_label(app_state),
                "description": snap.app_description,
            },
            "heaptrace": {
                "state": state_label(heap_state),
                "log_lines": self.board.log_lines().len(),
            },
            "archives": snap.archives,
        });
        let message = serde_json::to_string_pretty(&payload)
            .map_err(|e| make_error(format!("Status serialization failed: {}", e)))?;
        Ok(CallToolResult::success(vec![Content::text(message)]))
    }

    #[tool(description = "List captured trace files in the workspace trace directory")]
    async fn list_trace_archives(&self, Parameters(_args): Parameters<ListTraceArchivesArgs>) -> Result<CallToolResult, McpError> {
        use crate::view::TraceView;
        self.board.populate_archive_tree();
        let archives = self.board.archives();

        let message = if archives.is_empty() {
            format!("No trace files in {}", self.config.trace_dir().display())
        } else {
            format!(
                "Trace files in {}:\n{}",
                self.config.trace_dir().display(),
                archives.join("\n")
            )
        };
        Ok(CallToolResult::success(vec![Content::text(message)]))
    }

    #[tool(description = "Get the heap trace session log (command responses and TCL notifications)")]
    async fn heap_trace_log(&self, Parameters(args): Parameters<HeapTraceLogArgs>) -> Result<CallToolResult, McpError> {
        let lines = self.board.log_lines();
        let shown: Vec<String> = match args.tail {
            Some(n) if n < lines.len() => lines[lines.len() - n..].to_vec(),
            _ => lines,
        };

        let message = if shown.is_empty() {
            "Heap trace log is empty".to_string()
        } else {
            shown.join("\n")
        };
        Ok(CallToolResult::success(vec![Content::text(message)]))
    }
}

#[tool_handler]
impl ServerHandler for TraceToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "ESP32 trace control via OpenOCD's TCL interface. Start OpenOCD \
                 with the target config before using the start tools. Tools: \
                 apptrace_start, apptrace_stop, heaptrace_start, heaptrace_stop, \
                 trace_status, list_trace_archives, heap_trace_log."
                    .to_string(),
            ),
        }
    }
}
