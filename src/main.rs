use color_eyre::{eyre::eyre, Result};
use padlink::config::{default_settings_path, load_settings};
use padlink::driver::{ChannelHost, DeviceInfo, DriverHandle, HostEvent};
use padlink::transport::sim::SimTransport;
use padlink::transport::{Endpoint, TransferStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEMO_DURATION: Duration = Duration::from_secs(5);
const REPORT_INTERVAL: Duration = Duration::from_millis(16);
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path).await?;

    let sim = SimTransport::new();
    sim.auto_complete_writes(true);
    let (host, host_events) = ChannelHost::channel(256);

    info!("Starting driver against simulated device");
    let driver = DriverHandle::spawn(
        DeviceInfo::xbox_360(),
        settings,
        Arc::new(sim.clone()),
        Box::new(host),
    )
    .map_err(|e| eyre!("Failed to spawn driver: {}", e))?;

    let stop = CancellationToken::new();
    let device_task = tokio::spawn(run_scripted_device(sim, stop.clone()));
    let logger_task = tokio::spawn(log_host_events(host_events));

    tokio::time::sleep(Duration::from_secs(2)).await;
    driver
        .rumble(0x40, 0x40)
        .await
        .map_err(|e| eyre!("Rumble failed: {}", e))?;
    driver
        .set_led(0x06)
        .await
        .map_err(|e| eyre!("LED command failed: {}", e))?;

    tokio::time::sleep(DEMO_DURATION - Duration::from_secs(2)).await;
    stop.cancel();
    join_logged(device_task, "Scripted device").await;

    let status = driver
        .detach()
        .await
        .map_err(|e| eyre!("Failed to detach driver: {}", e))?;
    info!(
        "Final status: {} reports, {} discarded, accessory active: {}",
        status.reports_published, status.frames_discarded, status.accessory_active
    );

    join_logged(logger_task, "Host event logger").await;
    Ok(())
}

/// Waits for a helper task. Returns false when it panicked or was cancelled.
async fn join_logged(task: JoinHandle<()>, name: &str) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!("{} task failed: {}", name, e);
            false
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Plays a pad with a slowly circling left stick and an accessory that
/// answers every poll.
async fn run_scripted_device(sim: SimTransport, stop: CancellationToken) {
    let mut reports = tokio::time::interval(REPORT_INTERVAL);
    let mut keepalives = tokio::time::interval(KEEPALIVE_INTERVAL);
    let mut step: u32 = 0;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = reports.tick() => {
                step = step.wrapping_add(1);
                let report = scripted_report(step);
                if !sim.complete_read(Endpoint::Primary, &report, TransferStatus::Success) {
                    debug!("No primary read armed");
                }
            }
            _ = keepalives.tick() => {
                let frame = [0x00, 0x00, 0x00, 0x00, 0x00];
                if !sim.complete_read(Endpoint::Accessory, &frame, TransferStatus::Success) {
                    debug!("No accessory read armed");
                }
            }
        }
    }
}

fn scripted_report(step: u32) -> [u8; 20] {
    let angle = f64::from(step % 360).to_radians();
    let x = (angle.cos() * 30000.0) as i16;
    let y = (angle.sin() * 30000.0) as i16;
    let buttons: u16 = if step % 120 < 10 { 1 << 12 } else { 0 };

    let mut report = [0u8; 20];
    report[1] = 20;
    report[2..4].copy_from_slice(&buttons.to_le_bytes());
    report[6..8].copy_from_slice(&x.to_le_bytes());
    report[8..10].copy_from_slice(&y.to_le_bytes());
    report
}

async fn log_host_events(mut events: mpsc::Receiver<HostEvent>) {
    let mut reports = 0u64;
    while let Some(event) = events.recv().await {
        match event {
            HostEvent::Report(state) => {
                reports += 1;
                if reports % 60 == 0 {
                    info!(
                        "Pad: buttons={:#06x} L=({}, {}) R=({}, {})",
                        state.buttons, state.left.x, state.left.y, state.right.x, state.right.y
                    );
                }
            }
            HostEvent::AccessoryReport(frame) => debug!("Accessory frame: {:02x?}", frame.as_bytes()),
            HostEvent::PadAttached(profile) => info!("Pad attached as {}", profile.name),
            HostEvent::PadDetached => info!("Pad detached"),
            HostEvent::AccessoryConnected => info!("Accessory connected"),
            HostEvent::AccessoryDisconnected => warn!("Accessory disconnected"),
        }
    }
    info!("Host event stream closed after {} reports", reports);
}
