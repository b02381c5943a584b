//! Application-trace session
//!
//! Drives `esp32 apptrace start/status/stop` against OpenOCD: one single-shot
//! client issues the start command, a persistent client polls the capture
//! status until OpenOCD reports the trace stopped.

use std::sync::{Arc, Mutex};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, TraceError};
use crate::session::{leave_active, SessionState};
use crate::tcl::{TclClient, TclConnection, TclEvent, TclMode};
use crate::utils::{ensure_trace_dir, trace_file_uri};
use crate::view::{TraceKind, TraceView};

const STATUS_STOPPED: &str = "Tracing is STOPPED";
const STATUS_NOT_RUNNING: &str = "Tracing is not running!";

/// Parse a `"<done> of <total>"` status fragment into a rounded percentage.
///
/// Returns `None` when the pattern is absent or the numbers are unusable;
/// the caller falls back to a generic in-progress status.
pub fn parse_progress(text: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"([0-9]+) of ([0-9]+)").expect("static progress pattern")
    });
    let caps = re.captures(text)?;
    let done: f64 = caps[1].parse().ok()?;
    let total: f64 = caps[2].parse().ok()?;
    if total == 0.0 {
        return None;
    }
    Some((done / total * 100.0).round() as u32)
}

struct PollContext {
    state: Arc<Mutex<SessionState>>,
    view: Arc<dyn TraceView>,
    /// Single-shot client that issued `esp32 apptrace start`; kept so the
    /// termination path can close its connection.
    starter: TclClient,
    poller: TclClient,
    poll_events: mpsc::UnboundedReceiver<TclEvent>,
    shutdown: watch::Receiver<bool>,
    interval: Duration,
}

pub struct AppTraceSession {
    config: Arc<Config>,
    view: Arc<dyn TraceView>,
    state: Arc<Mutex<SessionState>>,
    shutdown: Option<watch::Sender<bool>>,
    poll_task: Option<JoinHandle<()>>,
}

impl AppTraceSession {
    pub fn new(config: Arc<Config>, view: Arc<dyn TraceView>) -> Self {
        Self {
            config,
            view,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            shutdown: None,
            poll_task: None,
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

    /// Start a capture and begin polling its status.
    pub async fn start(&mut self) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(TraceError::SessionBusy("apptrace"));
        }

        let conn = self.connection();
        if !TclClient::probe(&conn, self.probe_timeout()).await {
            warn!("Launch the OpenOCD server before starting app trace");
            return Err(TraceError::ServerUnreachable(format!(
                "{}:{}",
                conn.host, conn.port
            )));
        }

        let trace_dir = ensure_trace_dir(&self.config.workspace)?;
        let file_uri = trace_file_uri(&trace_dir, "trace", "trace");

        let app = &self.config.apptrace;
        let start_cmd = format!(
            "esp32 apptrace start {} {} {} {} {} {}",
            file_uri, app.poll_period, app.trace_size, app.stop_tmo, app.wait4halt, app.skip_size
        );

        *self.state.lock().expect("session state poisoned") = SessionState::Running;
        self.view.show_stop_button(TraceKind::App);
        self.view.update_description(TraceKind::App, "");

        let (mut starter, _starter_events) = TclClient::new(conn.clone(), TclMode::SingleShot);
        if let Err(e) = starter.send_command_with_capture(&start_cmd).await {
            leave_active(&self.state);
            self.view.show_start_button(TraceKind::App);
            return Err(e);
        }
        info!("App trace started: {}", file_uri);

        let (poller, poll_events) = TclClient::new(conn, TclMode::Persistent);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = PollContext {
            state: Arc::clone(&self.state),
            view: Arc::clone(&self.view),
            starter,
            poller,
            poll_events,
            shutdown: shutdown_rx,
            interval: Duration::from_millis(app.status_interval_ms),
        };
        self.poll_task = Some(tokio::spawn(poll_loop(ctx)));
        self.shutdown = Some(shutdown_tx);
        Ok(())
    }

    /// Ask OpenOCD to stop the capture.
    ///
    /// With the server unreachable the session is torn down locally and the
    /// unreachability is reported. Otherwise `esp32 apptrace stop` is issued
    /// once; a "not running" reply closes the session immediately, any other
    /// reply lets the status poll observe the stop on its next cycle.
    pub async fn stop(&mut self) -> Result<()> {
        let conn = self.connection();
        if !TclClient::probe(&conn, self.probe_timeout()).await {
            warn!("OpenOCD server unreachable, terminating app trace session locally");
            self.signal_shutdown();
            leave_active(&self.state);
            self.view.show_start_button(TraceKind::App);
            self.view.update_description(TraceKind::App, "[Terminated]");
            return Err(TraceError::ServerUnreachable(format!(
                "{}:{}",
                conn.host, conn.port
            )));
        }

        {
            let mut st = self.state.lock().expect("session state poisoned");
            if *st == SessionState::Running {
                *st = SessionState::Stopping;
            }
        }

        let (mut stopper, mut stop_events) = TclClient::new(conn, TclMode::SingleShot);
        stopper.send_command_with_capture("esp32 apptrace stop").await?;

        if let Some(TclEvent::Response(frame)) = stop_events.recv().await {
            let text = String::from_utf8_lossy(&frame);
            stopper.stop();
            if text.contains(STATUS_NOT_RUNNING) {
                self.signal_shutdown();
                leave_active(&self.state);
                self.view.show_start_button(TraceKind::App);
                self.view.update_description(TraceKind::App, "[NotRunning]");
            }
            // otherwise the poll task sees "Tracing is STOPPED" and finishes
        }
        Ok(())
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        self.poll_task.take();
    }
}

async fn poll_loop(mut ctx: PollContext) {
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + ctx.interval, ctx.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = ctx.poller.send_command_with_capture("esp32 apptrace status").await {
                    error!("App trace status poll failed: {}", e);
                    finish(&ctx, "[Stopped]");
                    break;
                }
            }
            ev = ctx.poll_events.recv() => match ev {
                Some(TclEvent::Response(frame)) => {
                    let text = String::from_utf8_lossy(&frame);
                    if text.contains(STATUS_STOPPED) {
                        info!("App trace capture finished");
                        finish(&ctx, "[Stopped]");
                        break;
                    }
                    match parse_progress(&text) {
                        Some(pct) => ctx.view.update_description(TraceKind::App, &format!("{}%", pct)),
                        None => ctx.view.update_description(TraceKind::App, "Tracing..."),
                    }
                }
                Some(TclEvent::Error(e)) => {
                    error!("App trace status transport failed: {}", e);
                    finish(&ctx, "[Stopped]");
                    break;
                }
                None => break,
            }
        }
    }

    ctx.starter.stop();
    ctx.poller.stop();
}

/// Terminal path of the poll loop; fires the view updates exactly once.
fn finish(ctx: &PollContext, label: &str) {
    if !leave_active(&ctx.state) {
        return;
    }
    ctx.view.show_start_button(TraceKind::App);
    ctx.view.update_description(TraceKind::App, label);
    ctx.view.populate_archive_tree();
}
