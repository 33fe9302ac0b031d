//! Driver core
//!
//! One task owns everything mutable: settings, the handshake, the endpoint
//! slots and the attach state of the logical devices. Transport completions,
//! handshake timer expiries and commands from the handle all arrive as
//! messages to that task, so they are serialized without a lock.
//!
//! ```text
//! Transport ─[Completion]─┐
//! DriverHandle ─[Command]─┼─► driver task ─► Peripheral<Running> ─► HostShell
//! handshake deadline ─────┘                        │
//!                                                  └─[DriverStatus]─► watch subscribers
//! ```

pub mod driver_handle;
pub mod host;
pub mod io_pump;
pub mod peripheral;
pub mod variant;

pub use driver_handle::DriverHandle;
pub use host::{ChannelHost, HostEvent, HostShell};
pub use io_pump::ReadState;
pub use variant::{ControllerType, ControllerVariant, DeviceInfo, DeviceProfile, PadState};

use crate::config::{ConfigError, Settings};
use crate::handshake::HandshakeState;
use crate::transport::{Endpoint, TransportError};
use chrono::{DateTime, Local};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] ConfigError),

    #[error("Bring-up failed: {0}")]
    BringUp(#[from] TransportError),

    #[error("Driver task is no longer running")]
    ChannelClosed,

    #[error("Driver task failed: {0}")]
    TaskFailed(String),
}

/// Requests from the handle to the driver task.
#[derive(Debug, Clone)]
pub enum DriverCommand {
    UpdateSettings(Settings),
    Rumble { strong: u8, weak: u8 },
    SetLed(u8),
    /// Rearm an endpoint that stopped after a terminal error.
    ResetEndpoint(Endpoint),
}

/// Snapshot published after every event the driver handles.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverStatus {
    pub variant: ControllerVariant,
    /// `None` when the device has no accessory port.
    pub handshake: Option<HandshakeState>,
    pub accessory_active: bool,
    pub accessory_attached: bool,
    pub pad_attached: bool,
    pub primary: ReadState,
    pub accessory: ReadState,
    pub reports_published: u64,
    pub frames_discarded: u64,
    pub writes_in_flight: usize,
    pub last_accessory_activity: Option<DateTime<Local>>,
    pub stopped: bool,
}

impl DriverStatus {
    pub fn new(variant: ControllerVariant) -> Self {
        Self {
            variant,
            handshake: None,
            accessory_active: false,
            accessory_attached: false,
            pad_attached: false,
            primary: ReadState::Idle,
            accessory: ReadState::Idle,
            reports_published: 0,
            frames_discarded: 0,
            writes_in_flight: 0,
            last_accessory_activity: None,
            stopped: false,
        }
    }
}
