//! BMC conversation: messages, transport seam, SDR reassembly, the sensor
//! registry and the discovery/reading state machine.

pub mod message;
pub mod reading;
pub mod reassembly;
pub mod registry;
pub mod subsystem;
pub mod transport;

pub use message::{Request, RequestHandle, Response};
pub use registry::Registry;
pub use subsystem::{ScanState, Subsystem};
pub use transport::{ChannelTransport, Transport};
