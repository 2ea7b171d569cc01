use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How often the log file rolls over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Console and file logging; `RUST_LOG` overrides `level`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive such as "info" or "minidrone_controller=debug"
    pub level: String,
    pub console: bool,
    pub ansi_colors: bool,
    /// Rolling file output, off unless configured
    pub file: bool,
    pub log_dir: PathBuf,
    pub file_name_prefix: String,
    pub rotation: LogRotation,
    /// Source file and line of each record
    pub show_source: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            ansi_colors: true,
            file: false,
            log_dir: PathBuf::from("logs"),
            file_name_prefix: "minidrone_controller".to_string(),
            rotation: LogRotation::default(),
            show_source: false,
        }
    }
}

/// Per-axis thresholds in degrees of deviation from the calibration center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisThresholds {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Orientation to movement mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Deviation below which an axis stays at 0
    #[serde(default = "default_sensitivity")]
    pub sensitivity: AxisThresholds,
    /// Deviation at which an axis reaches `max_speed`
    #[serde(default = "default_max_diff")]
    pub max_diff: AxisThresholds,
    /// Speed cap, at most 100
    #[serde(default = "default_max_speed")]
    pub max_speed: u8,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            sensitivity: default_sensitivity(),
            max_diff: default_max_diff(),
            max_speed: default_max_speed(),
        }
    }
}

fn default_sensitivity() -> AxisThresholds {
    AxisThresholds {
        yaw: 20.0,
        pitch: 15.0,
        roll: 20.0,
    }
}
fn default_max_diff() -> AxisThresholds {
    AxisThresholds {
        yaw: 60.0,
        pitch: 50.0,
        roll: 50.0,
    }
}
fn default_max_speed() -> u8 {
    50
}

/// What `emergency_cut_off` does with the emergency write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyPolicy {
    /// Spawn the write and log a failure
    #[default]
    FireAndForget,
    /// Await the write and return its result
    AwaitWrite,
}

/// Drive loop and session timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveSettings {
    /// Piloting frame cadence
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Speed used by the discrete move helpers
    #[serde(default = "default_speed")]
    pub default_speed: u8,
    /// How long a discrete move lasts before returning to hover
    #[serde(default = "default_drive_duration_ms")]
    pub drive_duration_ms: u64,
    /// Pause between subscribing to notifications and the handshake
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_low_battery_threshold")]
    pub low_battery_threshold: u8,
    #[serde(default)]
    pub emergency_policy: EmergencyPolicy,
    /// Date sent as the handshake frame (e.g. "2014-10-28"); no frame when unset
    #[serde(default)]
    pub handshake_date: Option<String>,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            default_speed: default_speed(),
            drive_duration_ms: default_drive_duration_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            low_battery_threshold: default_low_battery_threshold(),
            emergency_policy: EmergencyPolicy::default(),
            handshake_date: None,
        }
    }
}

impl DriveSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Number of drive loop ticks a discrete move lasts
    pub fn drive_steps(&self) -> u32 {
        (self.drive_duration_ms / self.interval_ms.max(1)).max(1) as u32
    }
}

fn default_interval_ms() -> u64 {
    100
}
fn default_speed() -> u8 {
    50
}
fn default_drive_duration_ms() -> u64 {
    1000
}
fn default_settle_delay_ms() -> u64 {
    100
}
fn default_low_battery_threshold() -> u8 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Orientation Control
    #[serde(default)]
    pub controller: ControllerSettings,

    // Drive Loop
    #[serde(default)]
    pub drive: DriveSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("MiniDroneController");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn update_controller(&mut self, controller: ControllerSettings) -> anyhow::Result<()> {
        self.settings.controller = controller;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{ "drive": { "interval_ms": 50 } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.drive.interval_ms, 50);
        assert_eq!(settings.drive.default_speed, 50);
        assert_eq!(settings.drive.emergency_policy, EmergencyPolicy::FireAndForget);
        assert_eq!(settings.controller.sensitivity.pitch, 15.0);
        assert_eq!(settings.log_settings.level, "info");
        assert_eq!(settings.log_settings.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_drive_steps_follow_interval() {
        let mut drive = DriveSettings::default();
        assert_eq!(drive.drive_steps(), 10);

        drive.interval_ms = 50;
        assert_eq!(drive.drive_steps(), 20);
    }

    #[test]
    fn test_log_rotation_names() {
        let log: LogSettings =
            serde_json::from_str(r#"{ "rotation": "hourly", "file": true }"#).unwrap();
        assert_eq!(log.rotation, LogRotation::Hourly);
        assert!(log.file);
        assert!(log.console);
    }

    #[test]
    fn test_emergency_policy_names() {
        let drive: DriveSettings =
            serde_json::from_str(r#"{ "emergency_policy": "await_write" }"#).unwrap();
        assert_eq!(drive.emergency_policy, EmergencyPolicy::AwaitWrite);
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!(
            "minidrone_settings_{}.json",
            std::process::id()
        ));

        let mut service = SettingsService::with_path(path.clone());
        service.get_mut().drive.handshake_date = Some("2014-10-28".to_string());
        let mut controller = ControllerSettings::default();
        controller.max_speed = 80;
        service.update_controller(controller).unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(reloaded.get().controller.max_speed, 80);
        assert_eq!(
            reloaded.get().drive.handshake_date.as_deref(),
            Some("2014-10-28")
        );

        let _ = fs::remove_file(path);
    }
}
