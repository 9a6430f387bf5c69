//! CLI module
//!
//! This module provides the command-line interface for Schema-Browser,
//! including the REPL implementation, command handlers and table rendering.

pub mod commands;
pub mod render;
pub mod repl;

// Re-exports
pub use commands::{Command, CommandHandler, CommandType};
pub use repl::Repl;
