//! BMC sensor discovery and monitoring over IPMI.
//!
//! Walks the SDR repository of a baseboard management controller, builds a
//! typed registry of temperature, voltage, current and fan sensors, and keeps
//! their readings fresh for the host.

pub mod app;
pub mod bmc;
pub mod config;
pub mod errors;
pub mod hardware;
pub mod profiles;
pub mod sdr;
pub mod system;
