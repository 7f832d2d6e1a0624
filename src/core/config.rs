use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub save: SaveConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub compact_on_start: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Accept admin/admin in admin mode even without a matching account
    #[serde(default)]
    pub builtin_admin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Create a bootstrap admin when no user list has been stored yet
    #[serde(default = "default_true")]
    pub bootstrap_admin: bool,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
    #[serde(default = "default_admin_login")]
    pub admin_login: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_department")]
    pub admin_department: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_barcode_prefix")]
    pub barcode_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_min_manual_length")]
    pub min_manual_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

// Default value functions
fn default_backend() -> StoreBackend {
    StoreBackend::File
}

fn default_store_path() -> PathBuf {
    PathBuf::from("keybureau.db")
}

fn default_true() -> bool {
    true
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

fn default_admin_login() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

fn default_admin_email() -> String {
    "admin@company.ru".to_string()
}

fn default_admin_department() -> String {
    "IT".to_string()
}

fn default_barcode_prefix() -> String {
    "KEY".to_string()
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_min_manual_length() -> usize {
    6
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

fn default_console() -> bool {
    false
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            compact_on_start: false,
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            bootstrap_admin: true,
            admin_name: default_admin_name(),
            admin_login: default_admin_login(),
            admin_password: default_admin_password(),
            admin_email: default_admin_email(),
            admin_department: default_admin_department(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            barcode_prefix: default_barcode_prefix(),
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            min_manual_length: default_min_manual_length(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::File && self.store.path.as_os_str().is_empty() {
            bail!("store.path must not be empty for the file backend");
        }

        if self.seed.bootstrap_admin {
            if self.seed.admin_login.trim().is_empty() {
                bail!("seed.admin_login must not be empty");
            }
            if self.seed.admin_password.is_empty() {
                bail!("seed.admin_password must not be empty");
            }
            if self.seed.admin_name.trim().is_empty() {
                bail!("seed.admin_name must not be empty");
            }
        }

        let prefix = &self.keys.barcode_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!(
                "Invalid barcode_prefix '{}'. Must be non-empty ASCII letters or digits",
                prefix
            );
        }

        if self.scanner.min_manual_length == 0 {
            bail!("scanner.min_manual_length must be greater than 0");
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}
