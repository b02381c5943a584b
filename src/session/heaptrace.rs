//! Heap-trace session
//!
//! Runs the fixed breakpoint/sysview procedure one command per response:
//! halt, arm two hardware breakpoints, resume to the first one, start the
//! sysview capture, resume to the second one, stop the capture. A second
//! persistent client subscribes to OpenOCD's TCL notifications so target
//! events land in the session log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, TraceError};
use crate::sequencer::CommandChain;
use crate::session::{leave_active, sleep_unless_shutdown, SessionState};
use crate::tcl::{TclClient, TclConnection, TclEvent, TclMode};
use crate::utils::{ensure_trace_dir, trace_file_uri};
use crate::view::{TraceKind, TraceView};

/// Breakpoint length for the `bp` command: one 32-bit instruction slot.
const BP_LENGTH: u32 = 4;

/// Per-start overrides of the configured breakpoint pair.
#[derive(Debug, Default, Clone)]
pub struct HeapTraceParams {
    pub start_breakpoint: Option<String>,
    pub stop_breakpoint: Option<String>,
}

/// The fixed 9-step capture procedure.
pub fn heap_trace_chain(start_bp: &str, stop_bp: &str, file_uri: &str) -> CommandChain {
    CommandChain::new()
        .append("reset halt")
        .append(format!("bp {} {} hw", start_bp, BP_LENGTH))
        .append(format!("bp {} {} hw", stop_bp, BP_LENGTH))
        .append("resume")
        .append(format!("rbp {}", start_bp))
        .append(format!("esp32 sysview start {}", file_uri))
        .append("resume")
        .append(format!("rbp {}", stop_bp))
        .append("esp32 sysview stop")
}

struct DriveContext {
    state: Arc<Mutex<SessionState>>,
    view: Arc<dyn TraceView>,
    chain: CommandChain,
    notifier: TclClient,
    notif_events: mpsc::UnboundedReceiver<TclEvent>,
    commander: TclClient,
    cmd_events: mpsc::UnboundedReceiver<TclEvent>,
    shutdown: watch::Receiver<bool>,
    initial_delay: Duration,
    settle_delay: Duration,
}

pub struct HeapTraceSession {
    config: Arc<Config>,
    view: Arc<dyn TraceView>,
    state: Arc<Mutex<SessionState>>,
    shutdown: Option<watch::Sender<bool>>,
    drive_task: Option<JoinHandle<()>>,
}

impl HeapTraceSession {
    pub fn new(config: Arc<Config>, view: Arc<dyn TraceView>) -> Self {
        Self {
            config,
            view,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            shutdown: None,
            drive_task: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state poisoned")
    }

    fn connection(&self) -> TclConnection {
        TclConnection::new(self.config.tcl.host.clone(), self.config.tcl.port)
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.config.tcl.probe_timeout_ms)
    }

    /// Start the capture procedure.
    pub async fn start(&mut self, params: HeapTraceParams) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(TraceError::SessionBusy("heaptrace"));
        }

        let conn = self.connection();
        if !TclClient::probe(&conn, self.probe_timeout()).await {
            warn!("Launch the OpenOCD server before starting heap trace");
            return Err(TraceError::ServerUnreachable(format!(
                "{}:{}",
                conn.host, conn.port
            )));
        }

        let trace_dir = ensure_trace_dir(&self.config.workspace)?;
        let file_uri = trace_file_uri(&trace_dir, "htrace", "svdat");

        let heap = &self.config.heaptrace;
        let start_bp = params
            .start_breakpoint
            .unwrap_or_else(|| heap.start_breakpoint.clone());
        let stop_bp = params
            .stop_breakpoint
            .unwrap_or_else(|| heap.stop_breakpoint.clone());
        let chain = heap_trace_chain(&start_bp, &stop_bp, &file_uri);

        self.view.clear_log();
        *self.state.lock().expect("session state poisoned") = SessionState::Running;
        self.view.show_stop_button(TraceKind::Heap);

        let (mut notifier, notif_events) = TclClient::new(conn.clone(), TclMode::Persistent);
        if let Err(e) = notifier.send_command_with_capture("tcl_notifications on").await {
            leave_active(&self.state);
            self.view.show_start_button(TraceKind::Heap);
            return Err(e);
        }

        let (commander, cmd_events) = TclClient::new(conn, TclMode::Persistent);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!("Heap trace started: {} ({} -> {})", file_uri, start_bp, stop_bp);

        let ctx = DriveContext {
            state: Arc::clone(&self.state),
            view: Arc::clone(&self.view),
            chain,
            notifier,
            notif_events,
            commander,
            cmd_events,
            shutdown: shutdown_rx,
            initial_delay: Duration::from_millis(heap.initial_delay_ms),
            settle_delay: Duration::from_millis(heap.settle_delay_ms),
        };
        self.drive_task = Some(tokio::spawn(drive(ctx)));
        self.shutdown = Some(shutdown_tx);
        Ok(())
    }

    /// Abrupt cancellation: stop both transports and return to Idle no matter
    /// how many chain steps remain.
    pub async fn stop(&mut self) -> Result<()> {
        let conn = self.connection();
        if !TclClient::probe(&conn, self.probe_timeout()).await {
            warn!("Launch the OpenOCD server before stopping heap trace");
            return Err(TraceError::ServerUnreachable(format!(
                "{}:{}",
                conn.host, conn.port
            )));
        }

        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        self.drive_task.take();
        if leave_active(&self.state) {
            self.view.show_start_button(TraceKind::Heap);
        }
        Ok(())
    }
}

async fn drive(mut ctx: DriveContext) {
    drive_chain(&mut ctx).await;
    ctx.notifier.stop();
    ctx.commander.stop();
}

async fn drive_chain(ctx: &mut DriveContext) {
    // Give the target a moment before the very first command.
    if !sleep_unless_shutdown(&mut ctx.shutdown, ctx.initial_delay).await {
        return;
    }

    match ctx.chain.advance() {
        Some(cmd) => {
            if let Err(e) = ctx.commander.send_command_with_capture(&cmd).await {
                error!("Heap trace could not issue first command: {}", e);
                fail(ctx);
                return;
            }
        }
        None => {
            complete(ctx);
            return;
        }
    }

    loop {
        tokio::select! {
            _ = ctx.shutdown.changed() => return,
            ev = ctx.cmd_events.recv() => match ev {
                Some(TclEvent::Response(frame)) => {
                    ctx.view
                        .append_log_line(&format!(">> {}", String::from_utf8_lossy(&frame)));
                    match ctx.chain.advance() {
                        None => {
                            info!("Heap trace procedure finished");
                            complete(ctx);
                            return;
                        }
                        Some(cmd) => {
                            // Settle time for the target to reach the next
                            // breakpoint after a resume.
                            if !sleep_unless_shutdown(&mut ctx.shutdown, ctx.settle_delay).await {
                                return;
                            }
                            if let Err(e) = ctx.commander.send_command_with_capture(&cmd).await {
                                error!("Heap trace step failed: {}", e);
                                fail(ctx);
                                return;
                            }
                        }
                    }
                }
                Some(TclEvent::Error(e)) => {
                    error!("Heap trace command transport failed: {}", e);
                    fail(ctx);
                    return;
                }
                None => return,
            },
            ev = ctx.notif_events.recv() => match ev {
                Some(TclEvent::Response(frame)) => {
                    ctx.view
                        .append_log_line(&format!("->> {}", String::from_utf8_lossy(&frame)));
                }
                Some(TclEvent::Error(e)) => {
                    warn!("Notification stream error: {}", e);
                }
                None => return,
            }
        }
    }
}

fn complete(ctx: &DriveContext) {
    if !leave_active(&ctx.state) {
        return;
    }
    ctx.view.populate_archive_tree();
    ctx.view.show_start_button(TraceKind::Heap);
}

fn fail(ctx: &DriveContext) {
    if !leave_active(&ctx.state) {
        return;
    }
    ctx.view.show_start_button(TraceKind::Heap);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_trace_chain_order() {
        let mut chain = heap_trace_chain("0x400d35b4", "0x400d35d0", "file:///t/h.svdat");
        assert_eq!(chain.remaining(), 9);
        assert_eq!(chain.advance().as_deref(), Some("reset halt"));
        assert_eq!(chain.advance().as_deref(), Some("bp 0x400d35b4 4 hw"));
        assert_eq!(chain.advance().as_deref(), Some("bp 0x400d35d0 4 hw"));
        assert_eq!(chain.advance().as_deref(), Some("resume"));
        assert_eq!(chain.advance().as_deref(), Some("rbp 0x400d35b4"));
        assert_eq!(
            chain.advance().as_deref(),
            Some("esp32 sysview start file:///t/h.svdat")
        );
        assert_eq!(chain.advance().as_deref(), Some("resume"));
        assert_eq!(chain.advance().as_deref(), Some("rbp 0x400d35d0"));
        assert_eq!(chain.advance().as_deref(), Some("esp32 sysview stop"));
        assert_eq!(chain.advance(), None);
    }
}
