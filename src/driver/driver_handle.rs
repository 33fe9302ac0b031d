//! Driver Handle - lifecycle and command API for one attached pad
//!
//! Spawning performs bring-up synchronously, so a device that cannot be
//! configured is reported to the caller instead of a background task. After
//! that the driver runs in its own tokio task until [`DriverHandle::detach`].

use super::host::HostShell;
use super::peripheral::{Peripheral, Running};
use super::variant::DeviceInfo;
use super::{DriverCommand, DriverError, DriverStatus};
use crate::config::Settings;
use crate::transport::{Completion, Endpoint, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

const COMMAND_QUEUE_CAPACITY: usize = 32;

/// How long teardown waits for aborted transfers to come back.
const TEARDOWN_GRACE: Duration = Duration::from_millis(250);

pub struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
    status: watch::Receiver<DriverStatus>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    // Dropping the handle without detach still stops the driver
    _stop_on_drop: DropGuard,
}

impl DriverHandle {
    /// Brings the device up and spawns the driver task.
    ///
    /// # Errors
    ///
    /// * [`DriverError::InvalidSettings`] - the settings do not validate
    /// * [`DriverError::BringUp`] - a required endpoint could not be armed
    pub fn spawn(
        device: DeviceInfo,
        settings: Settings,
        transport: Arc<dyn Transport>,
        host: Box<dyn HostShell>,
    ) -> Result<Self, DriverError> {
        info!("Spawning driver for {:?}", device);

        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
        let (commands, command_receiver) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();

        let peripheral =
            Peripheral::create(device, settings, transport, host, completion_sender)?.start()?;
        let status = peripheral.subscribe();

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            debug!("Driver task started");
            run_driver_loop(peripheral, completion_receiver, command_receiver, token).await;
            debug!("Driver task finished");
        });

        info!("Driver started");
        Ok(Self {
            commands,
            status,
            _stop_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }

    async fn send(&self, command: DriverCommand) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DriverError::ChannelClosed)
    }

    /// Validates and applies new settings.
    pub async fn update_settings(&self, settings: Settings) -> Result<(), DriverError> {
        settings.validate()?;
        self.send(DriverCommand::UpdateSettings(settings)).await
    }

    pub async fn rumble(&self, strong: u8, weak: u8) -> Result<(), DriverError> {
        self.send(DriverCommand::Rumble { strong, weak }).await
    }

    pub async fn set_led(&self, pattern: u8) -> Result<(), DriverError> {
        self.send(DriverCommand::SetLed(pattern)).await
    }

    pub async fn reset_endpoint(&self, endpoint: Endpoint) -> Result<(), DriverError> {
        self.send(DriverCommand::ResetEndpoint(endpoint)).await
    }

    pub fn subscribe(&self) -> watch::Receiver<DriverStatus> {
        self.status.clone()
    }

    pub fn status(&self) -> DriverStatus {
        self.status.borrow().clone()
    }

    /// Tears the driver down and waits for the task to finish.
    pub async fn detach(self) -> Result<DriverStatus, DriverError> {
        info!("Detaching driver");
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| DriverError::TaskFailed(e.to_string()))?;
        Ok(self.status.borrow().clone())
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_driver_loop(
    mut peripheral: Peripheral<Running>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    mut commands: mpsc::Receiver<DriverCommand>,
    cancel: CancellationToken,
) {
    let mut deadline = peripheral
        .first_tick_delay()
        .map(|delay| Instant::now() + delay);

    info!("Entering driver loop");
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Detach requested");
                break;
            }
            // Ahead of completions, read traffic must not delay a tick
            _ = wait_for_deadline(deadline) => {
                match peripheral.handshake_tick() {
                    Some(tick) => {
                        // Rearm first, then attach or detach the accessory
                        deadline = Some(Instant::now() + tick.next_delay);
                        peripheral.apply_link_event(tick.event);
                    }
                    None => deadline = None,
                }
            }
            Some(completion) = completions.recv() => {
                peripheral.on_completion(completion);
            }
            Some(command) = commands.recv() => {
                debug!("Command: {:?}", command);
                peripheral.on_command(command);
            }
        }
    }

    // Timer is cancelled by leaving the loop
    let mut stopping = peripheral.stop();
    while stopping.has_outstanding() {
        match timeout(TEARDOWN_GRACE, completions.recv()).await {
            Ok(Some(completion)) => stopping.on_completion(completion),
            Ok(None) => break,
            Err(_) => {
                warn!("Transfers still in flight after teardown grace period");
                break;
            }
        }
    }
    while let Ok(completion) = completions.try_recv() {
        stopping.on_completion(completion);
    }

    let status = stopping.release();
    info!(
        "Driver stopped: {} reports published, {} frames discarded",
        status.reports_published, status.frames_discarded
    );
}
