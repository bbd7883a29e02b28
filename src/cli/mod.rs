//! Command-line interface for lessonforge.
//!
//! Provides commands for batch generation, listing stored content,
//! checking payload files, and regenerating a single unit.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
