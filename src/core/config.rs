use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub kiosk: KioskConfig,
    /// Locations created at boot if no location of that name exists yet
    #[serde(default)]
    pub locations: Vec<LocationSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub port: u16,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
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

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_wal_path")]
    pub wal_path: PathBuf,
}

#[derive(Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_min_sid")]
    pub min_sid: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KioskConfig {
    /// How long after a "needs waiver" outcome the waiver may be accepted
    #[serde(default = "default_waiver_window")]
    pub waiver_window_secs: u64,
    /// Events buffered per location before a slow kiosk starts missing them
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Clone, Deserialize)]
pub struct LocationSeed {
    pub name: String,
    pub secret: String,
    #[serde(default)]
    pub types: Vec<TypeSeed>,
    #[serde(default)]
    pub machines: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeSeed {
    pub name: String,
    pub level: i32,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

fn default_wal_path() -> PathBuf {
    PathBuf::from("checkin.wal")
}

fn default_directory_timeout() -> u64 {
    10
}

fn default_session_ttl() -> u64 {
    900 // 15 minutes
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_min_sid() -> i64 {
    20_000_000
}

fn default_waiver_window() -> u64 {
    600 // 10 minutes
}

fn default_event_capacity() -> usize {
    64
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

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            wal_path: default_wal_path(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_directory_timeout(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            min_sid: default_min_sid(),
        }
    }
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            waiver_window_secs: default_waiver_window(),
            event_capacity: default_event_capacity(),
        }
    }
}

// Credentials stay out of logs
impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for LocationSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSeed")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("machines", &self.machines)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("Server port must be greater than 0");
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

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

        if self.storage.wal_path.as_os_str().is_empty() {
            bail!("wal_path must not be empty");
        }

        if self.directory.enabled {
            if self.directory.url.is_empty() {
                bail!("directory.url must not be empty when the directory is enabled");
            }
            if self.directory.timeout_secs == 0 {
                bail!("directory.timeout_secs must be greater than 0");
            }
        }

        if self.admin.session_ttl_secs == 0 {
            bail!("session_ttl_secs must be greater than 0");
        }

        if self.admin.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than 0");
        }

        if self.registration.min_sid < 0 {
            bail!("min_sid must be non-negative");
        }

        if self.kiosk.waiver_window_secs == 0 {
            bail!("waiver_window_secs must be greater than 0");
        }

        if self.kiosk.event_capacity == 0 {
            bail!("event_capacity must be greater than 0");
        }

        let mut names = HashSet::new();
        for location in &self.locations {
            if location.name.trim().is_empty() {
                bail!("Location name must not be empty");
            }

            if !names.insert(location.name.as_str()) {
                bail!("Duplicate location '{}'", location.name);
            }

            if location.secret.is_empty() {
                bail!("Location '{}' must have a secret", location.name);
            }

            let regular = location.types.iter().filter(|t| t.level == 0).count();
            if regular != 1 {
                bail!(
                    "Location '{}' must define exactly one type with level 0, found {}",
                    location.name,
                    regular
                );
            }

            if let Some(t) = location.types.iter().find(|t| t.level < 0) {
                bail!("Type '{}' of location '{}' has a negative level", t.name, location.name);
            }
        }

        Ok(())
    }
}
