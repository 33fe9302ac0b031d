//! In-memory transport
//!
//! Records every submission and lets the caller decide when and how each
//! transfer completes. Used by the driver tests and by the demo binary.

use super::{
    ControlRequest, Endpoint, ReadRequest, Rejected, Transport, TransportError, TransferStatus,
    WriteRequest,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

const DEFAULT_PACKET_SIZE: usize = 32;

/// A control request as seen by the simulated device.
#[derive(Debug, Clone)]
pub struct RecordedControl {
    pub at: Instant,
    pub request: ControlRequest,
}

/// A write as seen by the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub endpoint: Endpoint,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimState {
    pending_reads: HashMap<Endpoint, ReadRequest>,
    pending_writes: Vec<WriteRequest>,
    reads_submitted: HashMap<Endpoint, usize>,
    writes: Vec<RecordedWrite>,
    controls: Vec<RecordedControl>,
    aborted: Vec<Endpoint>,
    cleared: Vec<Endpoint>,
    unavailable: HashSet<Endpoint>,
    failing_controls: HashSet<u8>,
    auto_complete_writes: bool,
}

/// Cloneable handle to one simulated device.
#[derive(Debug, Clone, Default)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device without the accessory endpoint.
    pub fn without_accessory() -> Self {
        let sim = Self::new();
        sim.set_unavailable(Endpoint::Accessory);
        sim
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not hide the recorded state from others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_unavailable(&self, endpoint: Endpoint) {
        self.state().unavailable.insert(endpoint);
    }

    /// Makes every control request with this request code fail.
    pub fn fail_control(&self, request: u8) {
        self.state().failing_controls.insert(request);
    }

    /// Completes every write with success as soon as it is submitted.
    pub fn auto_complete_writes(&self, enabled: bool) {
        self.state().auto_complete_writes = enabled;
    }

    /// Completes the pending read on `endpoint` with `data`.
    ///
    /// Returns false when no read is armed.
    pub fn complete_read(&self, endpoint: Endpoint, data: &[u8], status: TransferStatus) -> bool {
        let Some(mut request) = self.state().pending_reads.remove(&endpoint) else {
            return false;
        };
        let received = data.len().min(request.buffer.len());
        request.buffer[..received].copy_from_slice(&data[..received]);
        request.complete(status, received);
        true
    }

    /// Completes the pending read on `endpoint` without data.
    pub fn fail_read(&self, endpoint: Endpoint, status: TransferStatus) -> bool {
        let Some(request) = self.state().pending_reads.remove(&endpoint) else {
            return false;
        };
        request.complete(status, 0);
        true
    }

    /// Completes all pending writes with `status`. Returns how many completed.
    pub fn complete_writes(&self, status: TransferStatus) -> usize {
        let pending = std::mem::take(&mut self.state().pending_writes);
        let count = pending.len();
        for request in pending {
            request.complete(status);
        }
        count
    }

    pub fn has_pending_read(&self, endpoint: Endpoint) -> bool {
        self.state().pending_reads.contains_key(&endpoint)
    }

    pub fn reads_submitted(&self, endpoint: Endpoint) -> usize {
        self.state()
            .reads_submitted
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn pending_writes(&self) -> usize {
        self.state().pending_writes.len()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state().writes.clone()
    }

    pub fn controls(&self) -> Vec<RecordedControl> {
        self.state().controls.clone()
    }

    pub fn aborted(&self) -> Vec<Endpoint> {
        self.state().aborted.clone()
    }

    pub fn cleared(&self) -> Vec<Endpoint> {
        self.state().cleared.clone()
    }
}

impl Transport for SimTransport {
    fn submit_read(&self, request: ReadRequest) -> Result<(), Rejected<ReadRequest>> {
        let mut state = self.state();
        let endpoint = request.endpoint;
        if state.unavailable.contains(&endpoint) {
            return Err(Rejected::new(
                request,
                TransportError::EndpointUnavailable(endpoint),
            ));
        }
        if state.pending_reads.contains_key(&endpoint) {
            return Err(Rejected::new(request, TransportError::ReadInFlight(endpoint)));
        }
        *state.reads_submitted.entry(endpoint).or_default() += 1;
        state.pending_reads.insert(endpoint, request);
        Ok(())
    }

    fn submit_write(&self, request: WriteRequest) -> Result<(), Rejected<WriteRequest>> {
        let mut state = self.state();
        if state.unavailable.contains(&request.endpoint) {
            let endpoint = request.endpoint;
            return Err(Rejected::new(
                request,
                TransportError::EndpointUnavailable(endpoint),
            ));
        }
        state.writes.push(RecordedWrite {
            endpoint: request.endpoint,
            bytes: request.buffer.clone(),
        });
        if state.auto_complete_writes {
            drop(state);
            request.complete(TransferStatus::Success);
        } else {
            state.pending_writes.push(request);
        }
        Ok(())
    }

    fn control(&self, request: ControlRequest) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state();
        let code = request.request;
        let length = request.data.len();
        let is_in = request.is_in();
        state.controls.push(RecordedControl {
            at: Instant::now(),
            request,
        });
        if state.failing_controls.contains(&code) {
            return Err(TransportError::ControlFailed {
                request: code,
                reason: "stalled".to_string(),
            });
        }
        if is_in {
            Ok(vec![0u8; length])
        } else {
            Ok(Vec::new())
        }
    }

    fn clear_fault(&self, endpoint: Endpoint) {
        self.state().cleared.push(endpoint);
    }

    fn abort(&self, endpoint: Endpoint) {
        let (read, writes) = {
            let mut state = self.state();
            state.aborted.push(endpoint);
            let read = state.pending_reads.remove(&endpoint);
            let (writes, kept): (Vec<WriteRequest>, Vec<WriteRequest>) = std::mem::take(&mut state.pending_writes)
                .into_iter()
                .partition(|w| w.endpoint == endpoint);
            state.pending_writes = kept;
            (read, writes)
        };
        debug!(
            "Sim abort on {:?}: read pending={}, writes={}",
            endpoint,
            read.is_some(),
            writes.len()
        );
        if let Some(read) = read {
            read.complete(TransferStatus::Aborted, 0);
        }
        for write in writes {
            write.complete(TransferStatus::Aborted);
        }
    }

    fn max_packet_size(&self, endpoint: Endpoint) -> Option<usize> {
        if self.state().unavailable.contains(&endpoint) {
            None
        } else {
            Some(DEFAULT_PACKET_SIZE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Completion;
    use tokio::sync::mpsc;

    #[test]
    fn second_read_on_same_endpoint_is_rejected() {
        let sim = SimTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        sim.submit_read(ReadRequest::new(Endpoint::Primary, vec![0; 8], tx.clone()))
            .expect("first read");
        let rejected = sim
            .submit_read(ReadRequest::new(Endpoint::Primary, vec![0; 8], tx))
            .expect_err("second read must be refused");
        assert!(matches!(
            rejected.error,
            TransportError::ReadInFlight(Endpoint::Primary)
        ));
        assert_eq!(rejected.request.buffer.len(), 8);
        assert_eq!(sim.reads_submitted(Endpoint::Primary), 1);
    }

    #[test]
    fn abort_completes_pending_transfers() {
        let sim = SimTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sim.submit_read(ReadRequest::new(Endpoint::Accessory, vec![0; 8], tx.clone()))
            .expect("read");
        sim.submit_write(WriteRequest::new(Endpoint::Accessory, 1, vec![1], tx))
            .expect("write");

        sim.abort(Endpoint::Accessory);

        let mut statuses = Vec::new();
        while let Ok(completion) = rx.try_recv() {
            match completion {
                Completion::Read { status, .. } | Completion::Write { status, .. } => {
                    statuses.push(status)
                }
            }
        }
        assert_eq!(statuses, vec![TransferStatus::Aborted, TransferStatus::Aborted]);
        assert!(!sim.has_pending_read(Endpoint::Accessory));
        assert_eq!(sim.aborted(), vec![Endpoint::Accessory]);
    }

    #[test]
    fn completed_read_carries_data() {
        let sim = SimTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sim.submit_read(ReadRequest::new(Endpoint::Accessory, vec![0; 8], tx))
            .expect("read");
        assert!(sim.complete_read(Endpoint::Accessory, &[0, 1, 2, 3, 4], TransferStatus::Success));

        match rx.try_recv() {
            Ok(Completion::Read {
                buffer,
                bytes_remaining,
                ..
            }) => {
                assert_eq!(&buffer[..5], &[0, 1, 2, 3, 4]);
                assert_eq!(bytes_remaining, 3);
            }
            other => panic!("unexpected completion: {:?}", other),
        }
        assert!(!sim.complete_read(Endpoint::Accessory, &[0], TransferStatus::Success));
    }
}
