//! Library half of the `aura` CLI.
//!
//! Argument parsing and command handlers live here so they can be tested
//! without spawning the binary.
#![deny(unused_crate_dependencies)]

pub mod handlers;
pub mod parser;

// Used only by the binary entry point
use dotenvy as _;
use tracing_subscriber as _;

pub use parser::{Cli, Commands, MonitorArgs};
