//! Binary-side plumbing: command line and log output.

pub mod cli;
pub mod logging;
