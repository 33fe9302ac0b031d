//! Transport seam
//!
//! The driver never touches hardware directly. A host-specific transport
//! exposes the two endpoints of the claimed device and delivers every
//! completion as a [`Completion`] message on the channel carried by the
//! request. Requests own their buffers, so a read that is in flight cannot be
//! armed a second time.

pub mod sim;

use std::fmt::Debug;
use tokio::sync::mpsc;
use tracing::warn;

/// The two independent data endpoints of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Controller reports in, output packets out.
    Primary,
    /// Accessory traffic.
    Accessory,
}

impl Endpoint {
    pub const ALL: [Endpoint; 2] = [Endpoint::Primary, Endpoint::Accessory];
}

/// Final status of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Success,
    /// More data arrived than fit in the buffer. Recoverable.
    Overrun,
    /// The device stopped answering. Terminal for the endpoint.
    NotResponding,
    /// Cancelled by [`Transport::abort`].
    Aborted,
    /// Any other host error code.
    Failed(i32),
}

impl TransferStatus {
    /// Whether the transfer delivered usable data.
    pub fn delivered(&self) -> bool {
        matches!(self, TransferStatus::Success | TransferStatus::Overrun)
    }
}

/// A completed transfer, delivered to the driver actor.
#[derive(Debug)]
pub enum Completion {
    Read {
        endpoint: Endpoint,
        buffer: Vec<u8>,
        status: TransferStatus,
        /// Bytes of the buffer that were not filled.
        bytes_remaining: usize,
    },
    Write {
        endpoint: Endpoint,
        id: u64,
        buffer: Vec<u8>,
        status: TransferStatus,
    },
}

/// One read submission. Completing it hands the buffer back to the driver.
#[derive(Debug)]
pub struct ReadRequest {
    pub endpoint: Endpoint,
    pub buffer: Vec<u8>,
    reply: mpsc::UnboundedSender<Completion>,
}

impl ReadRequest {
    pub fn new(
        endpoint: Endpoint,
        buffer: Vec<u8>,
        reply: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            endpoint,
            buffer,
            reply,
        }
    }

    /// Completes the read. `received` bytes at the front of the buffer are valid.
    pub fn complete(self, status: TransferStatus, received: usize) {
        let bytes_remaining = self.buffer.len().saturating_sub(received);
        let completion = Completion::Read {
            endpoint: self.endpoint,
            buffer: self.buffer,
            status,
            bytes_remaining,
        };
        if self.reply.send(completion).is_err() {
            warn!("Read completion on {:?} dropped, driver is gone", self.endpoint);
        }
    }
}

/// One write submission.
#[derive(Debug)]
pub struct WriteRequest {
    pub endpoint: Endpoint,
    pub id: u64,
    pub buffer: Vec<u8>,
    reply: mpsc::UnboundedSender<Completion>,
}

impl WriteRequest {
    pub fn new(
        endpoint: Endpoint,
        id: u64,
        buffer: Vec<u8>,
        reply: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            endpoint,
            id,
            buffer,
            reply,
        }
    }

    pub fn complete(self, status: TransferStatus) {
        let completion = Completion::Write {
            endpoint: self.endpoint,
            id: self.id,
            buffer: self.buffer,
            status,
        };
        if self.reply.send(completion).is_err() {
            warn!("Write completion {} dropped, driver is gone", self.id);
        }
    }
}

/// Direction bit of a control request type.
pub const REQUEST_TYPE_IN: u8 = 0x80;
/// Vendor request, device recipient.
pub const REQUEST_TYPE_VENDOR_DEVICE: u8 = 0x40;
/// Vendor request, interface recipient.
pub const REQUEST_TYPE_VENDOR_INTERFACE: u8 = 0x41;

/// A synchronous control transfer on the default pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: Vec<u8>,
}

impl ControlRequest {
    pub fn is_in(&self) -> bool {
        self.request_type & REQUEST_TYPE_IN != 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Endpoint {0:?} is not available")]
    EndpointUnavailable(Endpoint),

    #[error("Endpoint {0:?} already has a read in flight")]
    ReadInFlight(Endpoint),

    #[error("Control request 0x{request:02x} failed: {reason}")]
    ControlFailed { request: u8, reason: String },

    #[error("Transport closed")]
    Closed,
}

/// A submission the transport refused. The request, and its buffer, come back.
#[derive(Debug)]
pub struct Rejected<T> {
    pub request: T,
    pub error: TransportError,
}

impl<T> Rejected<T> {
    pub fn new(request: T, error: TransportError) -> Self {
        Self { request, error }
    }
}

/// Host-specific access to the claimed device.
///
/// Submissions return immediately. Completions arrive later through the
/// request's reply channel, possibly from another thread.
pub trait Transport: Send + Sync + Debug + 'static {
    fn submit_read(&self, request: ReadRequest) -> Result<(), Rejected<ReadRequest>>;

    fn submit_write(&self, request: WriteRequest) -> Result<(), Rejected<WriteRequest>>;

    /// Performs a control transfer. For IN requests the returned bytes are the
    /// data stage.
    fn control(&self, request: ControlRequest) -> Result<Vec<u8>, TransportError>;

    /// Clears a stall or overrun condition on the endpoint.
    fn clear_fault(&self, endpoint: Endpoint);

    /// Cancels every transfer in flight on the endpoint. Each one still
    /// completes, with [`TransferStatus::Aborted`].
    fn abort(&self, endpoint: Endpoint);

    /// Largest packet the endpoint delivers, used to size read buffers.
    fn max_packet_size(&self, endpoint: Endpoint) -> Option<usize>;
}
