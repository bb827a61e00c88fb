//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use anyhow::{Context, Result};
use userdesk_common::crypto::{DEFAULT_ARGON2_ITERATIONS, DEFAULT_ARGON2_MEMORY_KIB};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub dashboard: DashboardSettings,
}

impl AppConfig {
    pub fn load(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = directories::ProjectDirs::from("io", "userdesk", "userdesk") {
            config_dir.config_dir().join("userdesk.toml")
        } else {
            PathBuf::from("userdesk.toml")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub db_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/userdesk.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Signing key for session tokens. A random key is used when unset,
    /// which invalidates tokens on every restart.
    pub jwt_secret: Option<String>,
    pub session_expiry_hours: u32,
    pub reset_expiry_minutes: u32,
    /// Argon2id memory cost in KiB.
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            session_expiry_hours: 24,
            reset_expiry_minutes: 60,
            argon2_memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
            argon2_iterations: DEFAULT_ARGON2_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub page_size: usize,
    /// Re-check row affordances before issuing update/delete calls.
    pub enforce_affordances: bool,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            page_size: 5,
            enforce_affordances: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serialization() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config.storage.db_path, deserialized.storage.db_path);
        assert_eq!(deserialized.dashboard.page_size, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            "[auth]\nsession_expiry_hours = 2\n\n[dashboard]\nenforce_affordances = false\n",
        )
        .unwrap();
        assert_eq!(config.auth.session_expiry_hours, 2);
        assert_eq!(config.auth.reset_expiry_minutes, 60);
        assert!(!config.dashboard.enforce_affordances);
        assert_eq!(config.dashboard.page_size, 5);
    }

    #[test]
    fn test_save_and_load() {
        let mut path = std::env::temp_dir();
        path.push(format!("userdesk_config_{}.toml", uuid::Uuid::new_v4()));

        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("s3cret".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.auth.jwt_secret.as_deref(), Some("s3cret"));

        std::fs::remove_file(&path).ok();
    }
}
