//! Peripheral lifecycle
//!
//! `Attaching` builds the driver state and performs bring-up, `Running`
//! handles completions, handshake ticks and commands, `Stopping` only takes
//! back the buffers of transfers that were aborted during teardown.

use super::host::HostShell;
use super::io_pump::{IoPump, ReadOutcome};
use super::variant::{ControllerVariant, DeviceInfo, PadState};
use super::{DriverCommand, DriverError, DriverStatus};
use crate::config::Settings;
use crate::handshake::{Handshake, LinkEvent, Tick, INITIAL_DELAY};
use crate::report::{classify_accessory, classify_primary, InputReport, PrimaryFrame};
use crate::transport::{
    Completion, ControlRequest, Endpoint, Transport, REQUEST_TYPE_IN, REQUEST_TYPE_VENDOR_DEVICE,
};
use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

const VENDOR_INIT_REQUEST: u8 = 0xa9;
const VENDOR_INIT_SEQUENCE: [(u16, u16); 3] = [(0xa30c, 0x4423), (0x2344, 0x7f03), (0x5839, 0x6832)];

const SWITCH_REQUEST: u8 = 0xa1;
const SWITCH_INDEX: u16 = 0xe416;

/// Payload of the accessory switch request for a device release.
fn switch_payload(release: u16) -> [u8; 2] {
    match release {
        0x0110 => [0x01, 0x02],
        0x0114 => [0x09, 0x00],
        other => {
            warn!(
                "Unknown device release 0x{:04x}, using default accessory switch payload",
                other
            );
            [0x01, 0x02]
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum DriverState {
    Attaching,
    Running,
    Stopping,
}

#[machine]
#[derive(Debug)]
pub struct Peripheral<S: DriverState> {
    device: DeviceInfo,
    settings: Settings,
    variant: ControllerVariant,
    pump: IoPump,
    host: Box<dyn HostShell>,
    // None when the device has no accessory port
    handshake: Option<Handshake>,
    accessory_attached: bool,
    pad_attached: bool,
    pad_state: PadState,
    status: DriverStatus,
    status_sender: watch::Sender<DriverStatus>,
}

// Available in every state
impl<S: DriverState> Peripheral<S> {
    pub fn subscribe(&self) -> watch::Receiver<DriverStatus> {
        self.status_sender.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn variant(&self) -> ControllerVariant {
        self.variant
    }

    fn publish_status(&mut self) {
        let status = &mut self.status;
        status.variant = self.variant;
        status.handshake = self.handshake.as_ref().map(|h| h.state());
        status.accessory_active = self.handshake.as_ref().is_some_and(|h| h.is_active());
        status.accessory_attached = self.accessory_attached;
        status.pad_attached = self.pad_attached;
        status.primary = self.pump.read_state(Endpoint::Primary);
        status.accessory = self.pump.read_state(Endpoint::Accessory);
        status.writes_in_flight = self.pump.writes_in_flight();
        self.status_sender.send_replace(self.status.clone());
    }

    fn send_control(&self, request: ControlRequest) -> bool {
        let code = request.request;
        let value = request.value;
        match self.pump.transport().control(request) {
            Ok(_) => true,
            Err(e) => {
                warn!("Control request 0x{:02x} value 0x{:04x} failed: {}", code, value, e);
                false
            }
        }
    }

    fn release_accessory(&mut self) {
        if self.accessory_attached {
            self.host.raise_disconnect();
            self.accessory_attached = false;
        }
    }

    fn release_pad(&mut self) {
        if self.pad_attached {
            self.host.detach_pad();
            self.pad_attached = false;
        }
    }
}

impl Peripheral<Attaching> {
    pub fn create(
        device: DeviceInfo,
        settings: Settings,
        transport: Arc<dyn Transport>,
        host: Box<dyn HostShell>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Result<Self, DriverError> {
        settings.validate()?;
        let variant = ControllerVariant::select(device.hardware, settings.pretend_classic);
        info!("Creating peripheral for {:?} as {:?}", device.hardware, variant);

        let status = DriverStatus::new(variant);
        let (status_sender, _) = watch::channel(status.clone());
        let pump = IoPump::new(transport, completions);

        Ok(Self::new(
            device,
            settings,
            variant,
            pump,
            host,
            None,
            false,
            false,
            PadState::default(),
            status,
            status_sender,
        ))
    }

    /// Configures the device, arms both reads and attaches the pad.
    pub fn start(mut self) -> Result<Peripheral<Running>, DriverError> {
        if self.device.has_accessory_port {
            self.configure_accessory_port();
            if let Err(e) = self.pump.attach(Endpoint::Accessory) {
                error!("Failed to arm accessory read: {}", e);
                self.pump.shutdown();
                return Err(e.into());
            }
            self.handshake = Some(Handshake::new());
        } else {
            debug!("Device has no accessory port, skipping handshake");
        }

        if let Err(e) = self.pump.attach(Endpoint::Primary) {
            error!("Failed to arm primary read: {}", e);
            self.pump.shutdown();
            return Err(e.into());
        }

        for packet in self.variant.init_writes() {
            if let Err(e) = self.pump.queue_write(Endpoint::Primary, &packet) {
                warn!("Init write failed: {}", e);
            }
        }

        let profile = self.variant.profile(&self.device);
        info!("Attaching pad as {} ({:04x}:{:04x})", profile.name, profile.vendor_id, profile.product_id);
        self.host.attach_pad(&profile);
        self.pad_attached = true;

        self.publish_status();
        Ok(self.transition())
    }

    fn configure_accessory_port(&mut self) {
        for (value, index) in VENDOR_INIT_SEQUENCE {
            self.send_control(ControlRequest {
                request_type: REQUEST_TYPE_VENDOR_DEVICE,
                request: VENDOR_INIT_REQUEST,
                value,
                index,
                data: Vec::new(),
            });
        }

        let payload = switch_payload(self.device.release);
        for out in [false, true, false] {
            let request_type = if out {
                REQUEST_TYPE_VENDOR_DEVICE
            } else {
                REQUEST_TYPE_VENDOR_DEVICE | REQUEST_TYPE_IN
            };
            let ok = self.send_control(ControlRequest {
                request_type,
                request: SWITCH_REQUEST,
                value: 0x0000,
                index: SWITCH_INDEX,
                data: payload.to_vec(),
            });
            // Some third-party pads refuse the switch and still work
            if !ok {
                warn!("Accessory switch refused, continuing without it");
                break;
            }
        }
    }
}

impl Peripheral<Running> {
    /// Delay until the first handshake tick, `None` without an accessory port.
    pub fn first_tick_delay(&self) -> Option<Duration> {
        self.handshake.as_ref().map(|_| INITIAL_DELAY)
    }

    pub fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Read {
                endpoint,
                buffer,
                status,
                bytes_remaining,
            } => match self.pump.complete_read(endpoint, buffer, status, bytes_remaining) {
                ReadOutcome::Received(received) => {
                    match endpoint {
                        Endpoint::Primary => self.handle_primary(received),
                        Endpoint::Accessory => self.handle_accessory(received),
                    }
                    self.pump.rearm(endpoint);
                }
                ReadOutcome::Halted => {
                    warn!("{:?} endpoint stopped", endpoint);
                }
            },
            Completion::Write {
                endpoint,
                id,
                buffer,
                status,
            } => self.pump.complete_write(endpoint, id, buffer, status),
        }
        self.publish_status();
    }

    fn handle_primary(&mut self, received: usize) {
        match classify_primary(self.pump.filled(Endpoint::Primary, received), received) {
            PrimaryFrame::Report(report) => self.publish_report(report),
            PrimaryFrame::Discard(reason) => {
                debug!("Discarded primary frame: {:?}", reason);
                self.status.frames_discarded += 1;
            }
        }
    }

    fn publish_report(&mut self, report: InputReport) {
        match self.variant.shape(&report, &self.settings, &self.pad_state) {
            Some(state) => {
                self.pad_state = state;
                self.host.publish_report(&state);
                self.status.reports_published += 1;
            }
            None => {
                debug!("{:?} report does not belong to {:?}", report, self.variant);
                self.status.frames_discarded += 1;
            }
        }
    }

    fn handle_accessory(&mut self, received: usize) {
        // A delivered transfer is activity whether or not it is framed
        if let Some(handshake) = self.handshake.as_mut() {
            handshake.mark_heard();
        }
        self.status.last_accessory_activity = Some(Local::now());

        match classify_accessory(self.pump.filled(Endpoint::Accessory, received), received) {
            Some(frame) => {
                if self.accessory_attached {
                    self.host.publish_accessory_report(&frame);
                }
            }
            None => {
                debug!("Discarded accessory frame of {} bytes", received);
                self.status.frames_discarded += 1;
            }
        }
    }

    /// Runs one handshake transition and sends its wire message. The caller
    /// rearms its timer with the returned delay before applying the event.
    pub fn handshake_tick(&mut self) -> Option<Tick> {
        let tick = self.handshake.as_mut()?.tick();
        debug!("Handshake tick sends 0x{:02x}", tick.command.value());
        self.send_control(tick.command.to_control_request());
        self.publish_status();
        Some(tick)
    }

    pub fn apply_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Connect) => {
                info!("Accessory connected");
                if !self.accessory_attached {
                    self.host.raise_connect();
                    self.accessory_attached = true;
                }
            }
            Some(LinkEvent::Disconnect) => {
                info!("Accessory disconnected");
                self.release_accessory();
            }
            None => return,
        }
        self.publish_status();
    }

    pub fn on_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::UpdateSettings(settings) => self.apply_settings(settings),
            DriverCommand::Rumble { strong, weak } => {
                match self.variant.rumble_packet(strong, weak, self.settings.rumble_mode()) {
                    Some(packet) => self.write(&packet),
                    None => debug!("Rumble disabled, ignoring"),
                }
            }
            DriverCommand::SetLed(pattern) => match self.variant.led_packet(pattern) {
                Some(packet) => self.write(&packet),
                None => debug!("{:?} has no LED ring", self.variant),
            },
            DriverCommand::ResetEndpoint(endpoint) => {
                if let Err(e) = self.pump.reset_endpoint(endpoint) {
                    warn!("Failed to reset {:?}: {}", endpoint, e);
                }
            }
        }
        self.publish_status();
    }

    fn write(&mut self, packet: &[u8]) {
        if let Err(e) = self.pump.queue_write(Endpoint::Primary, packet) {
            warn!("Output write failed: {}", e);
        }
    }

    fn apply_settings(&mut self, settings: Settings) {
        if let Err(e) = settings.validate() {
            warn!("Ignoring invalid settings: {}", e);
            return;
        }
        info!("Applying new settings (remap active: {})", settings.remap_active());
        let variant = ControllerVariant::select(self.device.hardware, settings.pretend_classic);
        self.settings = settings;

        if variant != self.variant {
            info!("Switching pad presentation from {:?} to {:?}", self.variant, variant);
            self.release_pad();
            self.variant = variant;
            self.pad_state = PadState::default();
            let profile = self.variant.profile(&self.device);
            self.host.attach_pad(&profile);
            self.pad_attached = true;
        }
    }

    /// Stops the handshake, aborts both endpoints and releases the logical
    /// devices. Aborted transfers still complete and must be fed to the
    /// returned machine.
    pub fn stop(mut self) -> Peripheral<Stopping> {
        info!("Stopping peripheral");
        if let Some(handshake) = self.handshake.as_mut() {
            handshake.reset();
        }
        self.pump.shutdown();
        self.release_accessory();
        self.release_pad();
        self.publish_status();
        self.transition()
    }
}

impl Peripheral<Stopping> {
    pub fn has_outstanding(&self) -> bool {
        self.pump.has_outstanding()
    }

    pub fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Read {
                endpoint,
                buffer,
                status,
                bytes_remaining,
            } => {
                // Shutting down, the pump never rearms here
                self.pump.complete_read(endpoint, buffer, status, bytes_remaining);
            }
            Completion::Write {
                endpoint,
                id,
                buffer,
                status,
            } => self.pump.complete_write(endpoint, id, buffer, status),
        }
    }

    /// Frees the endpoint buffers and publishes the final status.
    pub fn release(mut self) -> DriverStatus {
        self.pump.release_buffers();
        self.status.stopped = true;
        self.publish_status();
        info!("Peripheral released");
        self.status
    }
}
