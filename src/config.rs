//! Configuration management for the esp-trace MCP server

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "esp-trace")]
#[command(about = "MCP server for ESP32 app/heap tracing via OpenOCD's TCL interface")]
#[command(version)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// OpenOCD TCL host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// OpenOCD TCL port
    #[arg(long, default_value = "6666")]
    pub port: u16,

    /// Workspace root; trace output goes to <workspace>/trace
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Generate default configuration file
    #[arg(long)]
    pub generate_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,

    /// Show current configuration and exit
    #[arg(long)]
    pub show_config: bool,
}

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub tcl: TclServerConfig,
    pub apptrace: AppTraceConfig,
    pub heaptrace: HeapTraceConfig,
    /// Workspace root; the `trace` output directory lives under it.
    pub workspace: PathBuf,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcl: TclServerConfig::default(),
            apptrace: AppTraceConfig::default(),
            heaptrace: HeapTraceConfig::default(),
            workspace: PathBuf::from("."),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .map_err(|e| TraceError::InvalidConfig(format!("Failed to read config file: {}", e)))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| TraceError::InvalidConfig(format!("Invalid TOML syntax: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Merge command line arguments into configuration
    pub fn merge_args(&mut self, args: &Args) {
        self.tcl.host = args.host.clone();
        self.tcl.port = args.port;
        self.workspace = args.workspace.clone();
        self.logging.level = args.log_level.clone();
        self.logging.file = args.log_file.clone();
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tcl.port == 0 {
            return Err(TraceError::InvalidConfig("tcl.port must be > 0".to_string()));
        }
        if self.tcl.probe_timeout_ms == 0 {
            return Err(TraceError::InvalidConfig(
                "tcl.probe_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.apptrace.status_interval_ms == 0 {
            return Err(TraceError::InvalidConfig(
                "apptrace.status_interval_ms must be > 0".to_string(),
            ));
        }
        if self.apptrace.trace_size < -1 {
            return Err(TraceError::InvalidConfig(
                "apptrace.trace_size must be -1 or a positive size".to_string(),
            ));
        }
        if self.heaptrace.start_breakpoint.is_empty() || self.heaptrace.stop_breakpoint.is_empty() {
            return Err(TraceError::InvalidConfig(
                "heaptrace breakpoints must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate TOML configuration string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TraceError::InvalidConfig(format!("Failed to serialize config: {}", e)))
    }

    /// Directory trace output files are written to.
    pub fn trace_dir(&self) -> PathBuf {
        self.workspace.join("trace")
    }
}

/// OpenOCD TCL endpoint settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TclServerConfig {
    pub host: String,
    pub port: u16,
    /// Liveness probe connect timeout
    pub probe_timeout_ms: u64,
}

impl Default for TclServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6666,
            probe_timeout_ms: 2000,
        }
    }
}

/// Parameters of `esp32 apptrace start` plus the status poll cadence
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppTraceConfig {
    /// Data polling period on the target, milliseconds
    pub poll_period: u32,
    /// Maximum size of data to collect, bytes; -1 = unlimited
    pub trace_size: i64,
    /// Idle timeout, seconds
    pub stop_tmo: i64,
    /// 0 = start immediately, else wait for halt
    pub wait4halt: u32,
    /// Bytes to skip at the start
    pub skip_size: u32,
    /// Host-side `esp32 apptrace status` poll interval
    pub status_interval_ms: u64,
}

impl Default for AppTraceConfig {
    fn default() -> Self {
        Self {
            poll_period: 1,
            trace_size: -1,
            stop_tmo: -1,
            wait4halt: 0,
            skip_size: 0,
            status_interval_ms: 5000,
        }
    }
}

/// Heap-trace procedure parameters.
///
/// The delays are hardware-timing heuristics: the target needs time to reach
/// a breakpoint after `resume`, and there is no protocol-level signal for it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HeapTraceConfig {
    /// Address of the breakpoint that starts the capture window
    pub start_breakpoint: String,
    /// Address of the breakpoint that ends the capture window
    pub stop_breakpoint: String,
    /// Delay before the very first command of the chain
    pub initial_delay_ms: u64,
    /// Settle delay between a response and the next command
    pub settle_delay_ms: u64,
}

impl Default for HeapTraceConfig {
    fn default() -> Self {
        Self {
            start_breakpoint: "0x400d35b4".to_string(),
            stop_breakpoint: "0x400d35d0".to_string(),
            initial_delay_ms: 1000,
            settle_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tcl.port, 6666);
        assert_eq!(config.apptrace.status_interval_ms, 5000);
        assert_eq!(config.heaptrace.settle_delay_ms, 5000);
        assert_eq!(config.heaptrace.initial_delay_ms, 1000);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml_str = config.to_toml().unwrap();
        assert!(toml_str.contains("[tcl]"));
        assert!(toml_str.contains("[apptrace]"));
        assert!(toml_str.contains("[heaptrace]"));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.tcl.host, config.tcl.host);
        assert_eq!(parsed.apptrace.trace_size, -1);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default();
        config.tcl.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_trace_size() {
        let mut config = Config::default();
        config.apptrace.trace_size = -2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_args() {
        let args = Args::parse_from([
            "esp-trace",
            "--host", "10.0.0.2",
            "--port", "7777",
            "--workspace", "/tmp/ws",
            "--log-level", "debug",
        ]);
        let mut config = Config::default();
        config.merge_args(&args);
        assert_eq!(config.tcl.host, "10.0.0.2");
        assert_eq!(config.tcl.port, 7777);
        assert_eq!(config.workspace, PathBuf::from("/tmp/ws"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.trace_dir(), PathBuf::from("/tmp/ws/trace"));
    }
}
