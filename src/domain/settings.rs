use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Timings and sizes for the USB firmware update transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DfuSettings {
    /// Block size for DFU_UPLOAD/DFU_DNLOAD. Not read from the functional
    /// descriptor, every supported board accepts 4096.
    #[serde(default = "default_transfer_size")]
    pub transfer_size: u16,
    /// wTimeout passed with DFU_DETACH
    #[serde(default = "default_detach_timeout_ms")]
    pub detach_timeout_ms: u16,
    /// How long to look for the device after it re-enumerates
    #[serde(default = "default_rediscovery_window_ms")]
    pub rediscovery_window_ms: u64,
    #[serde(default = "default_rediscovery_poll_ms")]
    pub rediscovery_poll_ms: u64,
    /// Wait after a USB reset the host refused to issue
    #[serde(default = "default_reset_backoff_ms")]
    pub reset_backoff_ms: u64,
    /// Wait after the device reappears before reopening it
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl DfuSettings {
    pub fn rediscovery_window(&self) -> Duration {
        Duration::from_millis(self.rediscovery_window_ms)
    }

    pub fn rediscovery_poll(&self) -> Duration {
        Duration::from_millis(self.rediscovery_poll_ms)
    }

    pub fn reset_backoff(&self) -> Duration {
        Duration::from_millis(self.reset_backoff_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for DfuSettings {
    fn default() -> Self {
        Self {
            transfer_size: default_transfer_size(),
            detach_timeout_ms: default_detach_timeout_ms(),
            rediscovery_window_ms: default_rediscovery_window_ms(),
            rediscovery_poll_ms: default_rediscovery_poll_ms(),
            reset_backoff_ms: default_reset_backoff_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// Wireless write queue behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteSettings {
    /// Total attempts per queued write, including the first; at most 3
    #[serde(default = "default_max_write_attempts")]
    pub max_attempts: u8,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_write_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Transport Settings
    #[serde(default)]
    pub dfu: DfuSettings,
    #[serde(default)]
    pub writes: WriteSettings,

    // Release Settings
    #[serde(default = "default_release_base_url")]
    pub release_base_url: String,
    #[serde(default)]
    pub board: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            dfu: DfuSettings::default(),
            writes: WriteSettings::default(),
            release_base_url: default_release_base_url(),
            board: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "controller_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_transfer_size() -> u16 {
    4096
}
fn default_detach_timeout_ms() -> u16 {
    1000
}
fn default_rediscovery_window_ms() -> u64 {
    2000
}
fn default_rediscovery_poll_ms() -> u64 {
    100
}
fn default_reset_backoff_ms() -> u64 {
    1000
}
fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_max_write_attempts() -> u8 {
    3
}
fn default_release_base_url() -> String {
    "https://passinglink.github.io/passinglink".to_string()
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

    /// Load settings from an explicit path, falling back to defaults when
    /// the file is missing or unreadable.
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
        path.push("ControllerLink");
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

    pub fn set_board(&mut self, board: &str) -> anyhow::Result<()> {
        if self.settings.board.as_deref() != Some(board) {
            self.settings.board = Some(board.to_string());
            self.save()?;
        }
        Ok(())
    }
}
