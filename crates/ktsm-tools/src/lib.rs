//! Load/save tools for `ktsm` shared memory segments.
//!
//! `ktsm load <key> <file>` copies a file into a new segment and keeps it
//! alive until Enter is pressed. `ktsm save <key> <file>` copies the payload
//! of an existing segment back out to a file. Run both from different
//! terminals to move a file between processes through shared memory.

#![warn(missing_docs)]

// Command line arguments
pub mod config;

// Segment payload copies
pub mod transfer;

pub use config::{Cli, Command};
