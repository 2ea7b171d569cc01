use crate::domain::models::{DroneEvent, LoopExit};
use crate::domain::settings::{LogRotation, LogSettings};
use std::str::FromStr;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub struct LoggingGuard {
    // Keep alive so buffered file logs get flushed
    _guards: Vec<WorkerGuard>,
}

fn rolling(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Install the global subscriber: `RUST_LOG` wins over the configured level
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();

    let level_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = if settings.console {
        Some(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_file(settings.show_source)
                .with_line_number(settings.show_source)
                .with_ansi(settings.ansi_colors),
        )
    } else {
        None
    };

    let file_layer = if settings.file {
        let file_appender = RollingFileAppender::new(
            rolling(settings.rotation),
            &settings.log_dir,
            &settings.file_name_prefix,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        guards.push(guard);
        Some(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(settings.show_source)
                .with_line_number(settings.show_source),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(level_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!("Logging initialized successfully");

    Ok(LoggingGuard { _guards: guards })
}

/// Log a session event at a level matching its severity
pub fn log_event(event: &DroneEvent) {
    match event {
        DroneEvent::StateChanged(state) => info!(target: "drone", "State: {:?}", state),
        DroneEvent::Movement(movement) => info!(
            target: "drone",
            "Movement: yaw {} pitch {} roll {} altitude {}",
            movement.yaw(),
            movement.pitch(),
            movement.roll(),
            movement.altitude()
        ),
        DroneEvent::FlightState(state) => info!(target: "drone", "Flight state: {:?}", state),
        DroneEvent::UnrecognizedFlightState(index) => {
            warn!(target: "drone", "Unrecognized flight state {}", index)
        }
        DroneEvent::Battery(percent) => info!(target: "drone", "Battery: {}%", percent),
        DroneEvent::LowBattery(percent) => warn!(target: "drone", "Low battery: {}%", percent),
        DroneEvent::DecodeFailed {
            characteristic,
            error,
        } => warn!(target: "drone", "Bad notification on {}: {}", characteristic, error),
        DroneEvent::Error(e) => error!(target: "drone", "{}", e),
        DroneEvent::DriveLoopStopped(LoopExit::Failed(e)) => {
            error!(target: "drone", "Drive loop failed: {}", e)
        }
        DroneEvent::DriveLoopStopped(exit) => {
            info!(target: "drone", "Drive loop stopped: {:?}", exit)
        }
    }
}
