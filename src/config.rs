use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transfer::StorageTarget;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Pacing of the simulated transfers. Steps are percentages added per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_download_interval_ms")]
    pub download_interval_ms: u64,
    #[serde(default = "default_download_step_min")]
    pub download_step_min: f64,
    #[serde(default = "default_download_step_max")]
    pub download_step_max: f64,
    #[serde(default = "default_upload_interval_ms")]
    pub upload_interval_ms: u64,
    #[serde(default = "default_upload_step_min")]
    pub upload_step_min: f64,
    #[serde(default = "default_upload_step_max")]
    pub upload_step_max: f64,
    /// Pause between reaching 100% and entering `processing`
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_processing_delay_ms")]
    pub processing_delay_ms: u64,
    #[serde(default = "default_finalizing_delay_ms")]
    pub finalizing_delay_ms: u64,
    #[serde(default)]
    pub download_storage: StorageTarget,
    #[serde(default = "default_sd_card_available")]
    pub sd_card_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_admin_emails")]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_key")]
    pub storage_key: String,
}

/// Support conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Delay before the scripted support reply
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,
}

fn default_download_interval_ms() -> u64 {
    200
}

fn default_download_step_min() -> f64 {
    2.0
}

fn default_download_step_max() -> f64 {
    7.0
}

fn default_upload_interval_ms() -> u64 {
    80
}

fn default_upload_step_min() -> f64 {
    0.0
}

fn default_upload_step_max() -> f64 {
    5.0
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_processing_delay_ms() -> u64 {
    2500
}

fn default_finalizing_delay_ms() -> u64 {
    1500
}

fn default_sd_card_available() -> bool {
    true
}

fn default_reply_delay_ms() -> u64 {
    1500
}

fn default_history_limit() -> usize {
    10
}

fn default_admin_emails() -> Vec<String> {
    vec![
        "ayahakuttyv@gmail.com".to_string(),
        "ktmuhammedrayyan@gmail.com".to_string(),
    ]
}

fn default_session_key() -> String {
    "thelden-user".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_interval_ms: default_download_interval_ms(),
            download_step_min: default_download_step_min(),
            download_step_max: default_download_step_max(),
            upload_interval_ms: default_upload_interval_ms(),
            upload_step_min: default_upload_step_min(),
            upload_step_max: default_upload_step_max(),
            settle_delay_ms: default_settle_delay_ms(),
            processing_delay_ms: default_processing_delay_ms(),
            finalizing_delay_ms: default_finalizing_delay_ms(),
            download_storage: StorageTarget::default(),
            sd_card_available: default_sd_card_available(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_emails: default_admin_emails(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: default_session_key(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: default_reply_delay_ms(),
        }
    }
}

impl ChatConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.download_interval_ms == 0 || self.upload_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "transfer tick intervals must be non-zero".to_string(),
            ));
        }

        let ranges = [
            ("download", self.download_step_min, self.download_step_max),
            ("upload", self.upload_step_min, self.upload_step_max),
        ];
        for (name, min, max) in ranges {
            // Progress must never go backwards
            if !(min >= 0.0) || !(max >= min) || !(max > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "{name} step range {min}..{max} is invalid"
                )));
            }
        }

        if self.download_storage == StorageTarget::SdCard && !self.sd_card_available {
            return Err(Error::InvalidConfig(
                "download_storage is sdCard but no SD card is available".to_string(),
            ));
        }
        Ok(())
    }

    pub fn download_interval(&self) -> Duration {
        Duration::from_millis(self.download_interval_ms)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_millis(self.upload_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn finalizing_delay(&self) -> Duration {
        Duration::from_millis(self.finalizing_delay_ms)
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "thelden").ok_or(Error::NoConfigDir)
}

pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn session_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("session"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        if !path.exists() {
            let config = Config::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.transfer.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_simulation_pacing() {
        let config = Config::default();
        assert_eq!(config.transfer.download_interval(), Duration::from_millis(200));
        assert_eq!(config.transfer.upload_interval(), Duration::from_millis(80));
        assert_eq!(config.library.history_limit, 10);
        assert_eq!(config.session.storage_key, "thelden-user");
        assert_eq!(config.chat.reply_delay(), Duration::from_millis(1500));
        assert_eq!(config.transfer.download_storage, StorageTarget::Internal);
        assert!(config.transfer.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [transfer]
            download_interval_ms = 50

            [auth]
            admin_emails = ["root@example.com"]
            "#,
        )
        .unwrap();
        assert_eq!(config.transfer.download_interval_ms, 50);
        assert_eq!(config.transfer.download_step_max, 7.0);
        assert_eq!(config.auth.admin_emails, vec!["root@example.com"]);
        assert_eq!(config.library.history_limit, 10);
    }

    #[test]
    fn test_rejects_backwards_progress() {
        let result = Config::from_toml(
            r#"
            [transfer]
            upload_step_min = -1.0
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let mut transfer = TransferConfig::default();
        transfer.download_step_min = 9.0;
        assert!(transfer.validate().is_err());

        transfer = TransferConfig::default();
        transfer.upload_interval_ms = 0;
        assert!(transfer.validate().is_err());
    }

    #[test]
    fn test_rejects_ranges_that_never_progress() {
        let result = Config::from_toml(
            r#"
            [transfer]
            upload_step_min = 0.0
            upload_step_max = 0.0
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let mut transfer = TransferConfig::default();
        transfer.download_step_min = 0.0;
        transfer.download_step_max = 0.0;
        assert!(transfer.validate().is_err());

        // A zero floor is fine as long as the ceiling is positive
        transfer.download_step_max = 3.0;
        assert!(transfer.validate().is_ok());
    }

    #[test]
    fn test_storage_target_from_toml() {
        let config = Config::from_toml(
            r#"
            [transfer]
            download_storage = "sdCard"
            "#,
        )
        .unwrap();
        assert_eq!(config.transfer.download_storage, StorageTarget::SdCard);

        let result = Config::from_toml(
            r#"
            [transfer]
            download_storage = "sdCard"
            sd_card_available = false
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = Config::from_toml(&content).unwrap();
        assert_eq!(parsed.auth.admin_emails.len(), 2);
    }
}
