//! OpenOCD TCL RPC transport

pub mod client;

pub use client::{TclClient, TclConnection, TclEvent, TclMode, TCL_DELIMITER};
