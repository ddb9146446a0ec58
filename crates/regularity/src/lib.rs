//! `regularity` crate (library surface).
//!
//! The primary entrypoint is the `regularity` binary (HTTP service + CLI). The router and
//! startup helpers live here so they can be embedded and tested without spawning a process.

pub mod server;
pub mod startup;

pub use regularity_core as core;
