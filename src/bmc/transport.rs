//! Transport seam between the core and whatever actually talks to the BMC.

use tokio::sync::mpsc;

use crate::bmc::message::{Request, RequestHandle};
use crate::errors::TransportError;

/// Sends addressed requests. The matching response is delivered later to
/// `Subsystem::on_response` together with the returned handle.
pub trait Transport {
    fn send(&mut self, request: Request) -> Result<RequestHandle, TransportError>;
}

/// Transport that queues requests on a channel for an async endpoint task.
pub struct ChannelTransport {
    next_handle: u64,
    tx: mpsc::UnboundedSender<(RequestHandle, Request)>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(RequestHandle, Request)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { next_handle: 0, tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, request: Request) -> Result<RequestHandle, TransportError> {
        self.next_handle += 1;
        let handle = RequestHandle(self.next_handle);
        self.tx.send((handle, request)).map_err(|_| TransportError::Closed)?;
        Ok(handle)
    }
}
