use anyhow::Context;
use minidrone_controller::domain::models::DroneEvent;
use minidrone_controller::domain::sensor::{OrientationFeed, RawOrientation};
use minidrone_controller::domain::settings::{Settings, SettingsService};
use minidrone_controller::infrastructure::bluetooth::protocol::{
    FlipDirection, BATTERY_STATUS_CHAR_UUID, FLIGHT_STATUS_CHAR_UUID,
};
use minidrone_controller::infrastructure::bluetooth::{DroneSession, MockTransport};
use minidrone_controller::infrastructure::logging::{init_logger, log_event};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let settings_service = match SettingsService::new() {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to load settings, using defaults: {}", e);
            SettingsService::with_path("settings.json".into())
        }
    };
    let settings = settings_service.get().clone();

    let _guard = init_logger(&settings.log_settings).context("Failed to initialize logging")?;
    info!("Starting MiniDrone Controller (simulated drone)");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    if let Err(e) = runtime.block_on(run(settings)) {
        error!("Demo flight failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Fly the simulated drone through the whole command set
async fn run(settings: Settings) -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DroneEvent>();
    let event_logger = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event);
        }
    });

    let mut session = DroneSession::new(transport.clone(), &settings, event_tx);
    session.connect().await?;

    transport.notify(BATTERY_STATUS_CHAR_UUID, vec![4, 1, 0, 5, 1, 0, 87]);
    session.take_off().await?;
    transport.notify(FLIGHT_STATUS_CHAR_UUID, vec![4, 1, 2, 3, 1, 0, 2, 0]);
    sleep(Duration::from_millis(500)).await;

    // Tilt forward and back, as a phone held in the hand would report
    session.start_movement();
    let (raw_tx, raw_rx) = mpsc::channel::<RawOrientation>(16);
    let producer = tokio::spawn(async move {
        for step in 0..120u32 {
            let beta = -40.0 * (step as f64 / 20.0).sin();
            if raw_tx.send(RawOrientation::new(0.0, beta, 0.0)).await.is_err() {
                break;
            }
            sleep(Duration::from_millis(1000 / 60)).await;
        }
    });

    let mut feed = OrientationFeed::new(raw_rx);
    session.run_orientation(&mut feed).await?;
    producer.await?;
    session.stop_movement();

    session.flip(FlipDirection::Back)?;
    sleep(Duration::from_millis(300)).await;
    session.turn(90)?;
    session.move_forwards()?;
    sleep(Duration::from_millis(1200)).await;

    session.land().await?;
    info!(
        "Landed after {} writes, battery {:?}%",
        transport.writes().len(),
        session.battery_level()
    );

    drop(session);
    event_logger.await?;
    Ok(())
}
