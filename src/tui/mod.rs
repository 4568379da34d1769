//! TUI debugger for the Universal Machine.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register bank and program counter
//! - Segment table view
//! - Step/run/breakpoint controls
//! - Disassembly of segment 0 and captured output

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
