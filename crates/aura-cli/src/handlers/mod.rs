//! Command handlers.
//!
//! Each handler is a thin wrapper: it takes parsed arguments, calls into
//! `aura-core` / `aura-presence`, and formats the result for the terminal.

pub mod agents;
pub mod classify;
pub mod devices;
pub mod monitor;
