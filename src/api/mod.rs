//! API Module
//!
//! Thin command layer the presentation side calls into. Every command
//! returns `Result<T, String>` so it can be handed to a UI unchanged.
//!
//! Structure:
//! - commands.rs: load / train / evaluate / predict / telemetry commands
//! - table.rs: evaluation result table with display formatting

pub mod commands;
pub mod table;

pub use commands::*;
pub use table::ResultTable;
