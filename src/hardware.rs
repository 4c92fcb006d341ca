//! BmcEndpoint trait and the endpoints behind it.

use anyhow::Result;
use async_trait::async_trait;

use crate::bmc::message::{Request, Response};

pub mod emulator;
pub mod monitor;
pub mod types;

pub use emulator::{EmulatorEndpoint, SimulatedBmc};
pub use monitor::{BmcSensorMonitor, MonitorHandle};

#[async_trait]
pub trait BmcEndpoint: Send + Sync {
    /// Run one IPMI request to completion.
    ///
    /// A BMC error completion code is a successful call returning a
    /// `Response` with that code; `Err` means the request never got an answer.
    async fn execute(&self, request: Request) -> Result<Response>;

    /// Short human-readable name for logs.
    fn describe(&self) -> String;
}
