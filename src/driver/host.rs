//! Host driver shell seam
//!
//! The host owns the logical devices the OS sees: the pad itself and the
//! accessory. The driver tells it when to create or drop them and pushes
//! shaped state into them. Attach and detach are not reentrant; the driver
//! only calls them from its own task.

use super::variant::{DeviceProfile, PadState};
use crate::report::AccessoryFrame;
use std::fmt::Debug;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub trait HostShell: Send + Debug {
    fn attach_pad(&mut self, profile: &DeviceProfile);
    fn detach_pad(&mut self);
    fn publish_report(&mut self, state: &PadState);
    fn raise_connect(&mut self);
    fn raise_disconnect(&mut self);
    fn publish_accessory_report(&mut self, frame: &AccessoryFrame);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    PadAttached(DeviceProfile),
    PadDetached,
    Report(PadState),
    AccessoryConnected,
    AccessoryDisconnected,
    AccessoryReport(AccessoryFrame),
}

/// Forwards every host call as a [`HostEvent`].
#[derive(Debug, Clone)]
pub struct ChannelHost {
    sender: mpsc::Sender<HostEvent>,
}

impl ChannelHost {
    pub fn new(sender: mpsc::Sender<HostEvent>) -> Self {
        Self { sender }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<HostEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }

    fn forward(&self, event: HostEvent) {
        // The driver task must never wait on a slow consumer
        if let Err(e) = self.sender.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    warn!("Host event queue full, dropping {:?}", event)
                }
                mpsc::error::TrySendError::Closed(event) => {
                    debug!("Host event receiver gone, dropping {:?}", event)
                }
            }
        }
    }
}

impl HostShell for ChannelHost {
    fn attach_pad(&mut self, profile: &DeviceProfile) {
        self.forward(HostEvent::PadAttached(profile.clone()));
    }

    fn detach_pad(&mut self) {
        self.forward(HostEvent::PadDetached);
    }

    fn publish_report(&mut self, state: &PadState) {
        self.forward(HostEvent::Report(*state));
    }

    fn raise_connect(&mut self) {
        self.forward(HostEvent::AccessoryConnected);
    }

    fn raise_disconnect(&mut self) {
        self.forward(HostEvent::AccessoryDisconnected);
    }

    fn publish_accessory_report(&mut self, frame: &AccessoryFrame) {
        self.forward(HostEvent::AccessoryReport(*frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (mut host, mut rx) = ChannelHost::channel(1);
        host.raise_connect();
        host.raise_disconnect();

        assert_eq!(rx.try_recv().ok(), Some(HostEvent::AccessoryConnected));
        assert!(rx.try_recv().is_err());
    }
}
