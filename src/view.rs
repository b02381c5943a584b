//! Host-facing surface the trace sessions report into.
//!
//! The sessions only know the [`TraceView`] trait; [`StatusBoard`] is the
//! in-process implementation backing the MCP status tools. It is constructed
//! once at startup and injected wherever needed.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, warn};

/// Which trace session a view update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    App,
    Heap,
}

impl TraceKind {
    pub fn label(self) -> &'static str {
        match self {
            TraceKind::App => "apptrace",
            TraceKind::Heap => "heaptrace",
        }
    }
}

/// UI surface contract consumed by the session state machines.
pub trait TraceView: Send + Sync {
    fn show_start_button(&self, kind: TraceKind);
    fn show_stop_button(&self, kind: TraceKind);
    fn update_description(&self, kind: TraceKind, text: &str);
    /// Re-scan the trace output directory after a capture finished.
    fn populate_archive_tree(&self);
    fn clear_log(&self);
    fn append_log_line(&self, line: &str);
}

#[derive(Debug, Default, Clone, Serialize)]
struct PanelState {
    stop_visible: bool,
    description: String,
}

#[derive(Debug, Default)]
struct BoardState {
    app: PanelState,
    heap: PanelState,
    log: Vec<String>,
    archives: Vec<String>,
}

/// Snapshot of the board, serialized into the `trace_status` tool reply.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub app_running: bool,
    pub app_description: String,
    pub heap_running: bool,
    pub heap_description: String,
    pub archives: Vec<String>,
}

/// Concrete [`TraceView`] recording button/description state, the heap-trace
/// log and the archive listing.
pub struct StatusBoard {
    trace_dir: PathBuf,
    state: Mutex<BoardState>,
}

impl StatusBoard {
    pub fn new(trace_dir: PathBuf) -> Self {
        Self {
            trace_dir,
            state: Mutex::new(BoardState::default()),
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.lock().expect("status board poisoned");
        BoardSnapshot {
            app_running: state.app.stop_visible,
            app_description: state.app.description.clone(),
            heap_running: state.heap.stop_visible,
            heap_description: state.heap.description.clone(),
            archives: state.archives.clone(),
        }
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.state.lock().expect("status board poisoned").log.clone()
    }

    pub fn archives(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("status board poisoned")
            .archives
            .clone()
    }

    fn panel<'a>(state: &'a mut BoardState, kind: TraceKind) -> &'a mut PanelState {
        match kind {
            TraceKind::App => &mut state.app,
            TraceKind::Heap => &mut state.heap,
        }
    }
}

impl TraceView for StatusBoard {
    fn show_start_button(&self, kind: TraceKind) {
        let mut state = self.state.lock().expect("status board poisoned");
        Self::panel(&mut state, kind).stop_visible = false;
    }

    fn show_stop_button(&self, kind: TraceKind) {
        let mut state = self.state.lock().expect("status board poisoned");
        Self::panel(&mut state, kind).stop_visible = true;
    }

    fn update_description(&self, kind: TraceKind, text: &str) {
        debug!("{} status: {}", kind.label(), text);
        let mut state = self.state.lock().expect("status board poisoned");
        Self::panel(&mut state, kind).description = text.to_string();
    }

    fn populate_archive_tree(&self) {
        let mut names = Vec::new();
        match std::fs::read_dir(&self.trace_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if entry.path().is_file() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                names.sort();
            }
            Err(e) => {
                warn!("Cannot list trace archive {}: {}", self.trace_dir.display(), e);
            }
        }
        let mut state = self.state.lock().expect("status board poisoned");
        state.archives = names;
    }

    fn clear_log(&self) {
        self.state.lock().expect("status board poisoned").log.clear();
    }

    fn append_log_line(&self, line: &str) {
        self.state
            .lock()
            .expect("status board poisoned")
            .log
            .push(line.to_string());
    }
}
