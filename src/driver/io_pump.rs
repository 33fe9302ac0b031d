//! I/O pump
//!
//! Keeps at most one read in flight per endpoint. The read buffer lives in
//! its endpoint slot while the endpoint is idle and travels inside the
//! [`ReadRequest`] while armed, so a second read cannot be armed by
//! construction. Reads are only armed from bring-up and from completion
//! handling.

use crate::transport::{
    Completion, Endpoint, ReadRequest, TransferStatus, Transport, TransportError, WriteRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadState {
    /// No read in flight, buffer held by the pump.
    #[default]
    Idle,
    Armed,
    /// Stopped after a terminal error or by shutdown.
    Halted,
}

/// What a read completion means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes at the front of the endpoint buffer are valid.
    Received(usize),
    /// The endpoint will not be rearmed.
    Halted,
}

#[derive(Debug, Default)]
struct Slot {
    state: ReadState,
    buffer: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct IoPump {
    transport: Arc<dyn Transport>,
    completions: mpsc::UnboundedSender<Completion>,
    primary: Slot,
    accessory: Slot,
    writes_in_flight: HashMap<u64, Endpoint>,
    next_write_id: u64,
    shutting_down: bool,
}

impl IoPump {
    pub fn new(transport: Arc<dyn Transport>, completions: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            transport,
            completions,
            primary: Slot::default(),
            accessory: Slot::default(),
            writes_in_flight: HashMap::new(),
            next_write_id: 0,
            shutting_down: false,
        }
    }

    fn slot(&self, endpoint: Endpoint) -> &Slot {
        match endpoint {
            Endpoint::Primary => &self.primary,
            Endpoint::Accessory => &self.accessory,
        }
    }

    fn slot_mut(&mut self, endpoint: Endpoint) -> &mut Slot {
        match endpoint {
            Endpoint::Primary => &mut self.primary,
            Endpoint::Accessory => &mut self.accessory,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn read_state(&self, endpoint: Endpoint) -> ReadState {
        self.slot(endpoint).state
    }

    pub fn writes_in_flight(&self) -> usize {
        self.writes_in_flight.len()
    }

    /// Whether any transfer is still owed a completion.
    pub fn has_outstanding(&self) -> bool {
        self.primary.state == ReadState::Armed
            || self.accessory.state == ReadState::Armed
            || !self.writes_in_flight.is_empty()
    }

    /// Allocates the endpoint's read buffer and arms the first read.
    pub fn attach(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        let size = self
            .transport
            .max_packet_size(endpoint)
            .ok_or(TransportError::EndpointUnavailable(endpoint))?;
        let slot = self.slot_mut(endpoint);
        slot.buffer = Some(vec![0u8; size]);
        slot.state = ReadState::Idle;
        debug!("Attached {:?} with {} byte buffer", endpoint, size);
        self.arm(endpoint)
    }

    fn arm(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        if self.shutting_down {
            return Err(TransportError::Closed);
        }
        let slot = self.slot_mut(endpoint);
        if slot.state == ReadState::Armed {
            return Err(TransportError::ReadInFlight(endpoint));
        }
        let buffer = slot
            .buffer
            .take()
            .ok_or(TransportError::EndpointUnavailable(endpoint))?;

        let request = ReadRequest::new(endpoint, buffer, self.completions.clone());
        match self.transport.submit_read(request) {
            Ok(()) => {
                self.slot_mut(endpoint).state = ReadState::Armed;
                Ok(())
            }
            Err(rejected) => {
                let slot = self.slot_mut(endpoint);
                slot.buffer = Some(rejected.request.buffer);
                slot.state = ReadState::Halted;
                Err(rejected.error)
            }
        }
    }

    /// Takes back the buffer of a finished read and decides whether data
    /// arrived. Overruns clear the endpoint fault and count as data.
    pub fn complete_read(
        &mut self,
        endpoint: Endpoint,
        buffer: Vec<u8>,
        status: TransferStatus,
        bytes_remaining: usize,
    ) -> ReadOutcome {
        let received = buffer.len().saturating_sub(bytes_remaining);
        let slot = self.slot_mut(endpoint);
        slot.buffer = Some(buffer);
        slot.state = ReadState::Idle;

        if status.delivered() {
            if status == TransferStatus::Overrun {
                warn!("Read overrun on {:?}, clearing fault", endpoint);
                self.transport.clear_fault(endpoint);
            }
            return ReadOutcome::Received(received);
        }

        if status == TransferStatus::Aborted {
            debug!("Read on {:?} aborted", endpoint);
        } else {
            warn!("Read on {:?} failed with {:?}, endpoint halted", endpoint, status);
        }
        self.slot_mut(endpoint).state = ReadState::Halted;
        ReadOutcome::Halted
    }

    /// The valid bytes of the last completed read.
    pub fn filled(&self, endpoint: Endpoint, received: usize) -> &[u8] {
        match &self.slot(endpoint).buffer {
            Some(buffer) => &buffer[..received.min(buffer.len())],
            None => &[],
        }
    }

    /// Arms the next read after a delivered completion. Returns whether a read
    /// is now in flight.
    pub fn rearm(&mut self, endpoint: Endpoint) -> bool {
        if self.shutting_down || self.slot(endpoint).state != ReadState::Idle {
            return false;
        }
        match self.arm(endpoint) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to rearm {:?}: {}", endpoint, e);
                false
            }
        }
    }

    /// Clears a halted endpoint and arms it again.
    pub fn reset_endpoint(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        if self.slot(endpoint).state != ReadState::Halted {
            return Ok(());
        }
        self.transport.clear_fault(endpoint);
        self.slot_mut(endpoint).state = ReadState::Idle;
        self.arm(endpoint)
    }

    /// Copies `payload` into a fresh buffer and submits it. The buffer is
    /// dropped when the write completes.
    pub fn queue_write(&mut self, endpoint: Endpoint, payload: &[u8]) -> Result<u64, TransportError> {
        if self.shutting_down {
            return Err(TransportError::Closed);
        }
        let id = self.next_write_id;
        self.next_write_id += 1;

        let request = WriteRequest::new(endpoint, id, payload.to_vec(), self.completions.clone());
        // Tracked before submission, the completion may arrive at any time after
        self.writes_in_flight.insert(id, endpoint);
        if let Err(rejected) = self.transport.submit_write(request) {
            self.writes_in_flight.remove(&id);
            warn!("Write {} on {:?} rejected: {}", id, endpoint, rejected.error);
            return Err(rejected.error);
        }
        Ok(id)
    }

    pub fn complete_write(&mut self, endpoint: Endpoint, id: u64, buffer: Vec<u8>, status: TransferStatus) {
        if self.writes_in_flight.remove(&id).is_none() {
            debug!("Completion for unknown write {} on {:?}", id, endpoint);
        }
        if status != TransferStatus::Success {
            warn!(
                "Write {} on {:?} ({} bytes) failed: {:?}",
                id,
                endpoint,
                buffer.len(),
                status
            );
        }
        drop(buffer);
    }

    /// Stops rearming and aborts both endpoints. In-flight transfers complete
    /// with an abort status afterwards.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
        for endpoint in Endpoint::ALL {
            self.transport.abort(endpoint);
        }
    }

    pub fn release_buffers(&mut self) {
        for endpoint in Endpoint::ALL {
            let slot = self.slot_mut(endpoint);
            slot.buffer = None;
            slot.state = ReadState::Halted;
        }
        self.writes_in_flight.clear();
    }
}
