//! ipmitool subprocess plumbing.

pub mod executor;
pub mod parser;

pub use executor::IpmitoolEndpoint;
