//! # rm-config
//!
//! Layered configuration for Rusty-Market: built-in defaults, then an
//! optional TOML file, then `RUSTY_MARKET__*` environment variables
//! (a `.env` file is read first when present).

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "rusty-market.toml";
pub const ENV_PREFIX: &str = "RUSTY_MARKET";
pub const MAX_SESSION_TTL_DAYS: u32 = 365;
pub const MAX_SALE_RETENTION_HOURS: u32 = 24 * 365;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Balance credited to every new account
    pub starting_balance: u64,
    pub session_ttl_days: u32,
    /// How long a completed sale stays visible before the sweep hides it
    pub sale_retention_hours: u32,
    pub sweep_interval_secs: u64,
    pub listing_refresh_secs: u64,
    /// Where the client-side session record is kept
    pub session_dir: PathBuf,
    /// JSON seed data loaded at startup
    pub fixtures_path: Option<PathBuf>,
    pub log_format: LogFormat,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    #[serde(deserialize_with = "optional_secret")]
    pub password_pepper: Option<SecretString>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            starting_balance: 5_000_000,
            session_ttl_days: 7,
            sale_retention_hours: 24,
            sweep_interval_secs: 60,
            listing_refresh_secs: 30,
            session_dir: PathBuf::from("./data/client"),
            fixtures_path: None,
            log_format: LogFormat::Text,
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
            password_pepper: None,
        }
    }
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

impl MarketConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn listing_refresh(&self) -> Duration {
        Duration::from_secs(self.listing_refresh_secs)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&self.session_ttl_days) {
            return Err(ConfigError::Invalid(format!(
                "session_ttl_days must be between 1 and {MAX_SESSION_TTL_DAYS}"
            )));
        }
        if !(1..=MAX_SALE_RETENTION_HOURS).contains(&self.sale_retention_hours) {
            return Err(ConfigError::Invalid(format!(
                "sale_retention_hours must be between 1 and {MAX_SALE_RETENTION_HOURS}"
            )));
        }
        if self.sweep_interval_secs == 0 || self.listing_refresh_secs == 0 {
            return Err(ConfigError::Invalid("timer intervals must be non-zero".into()));
        }
        if self.argon2_iterations == 0 {
            return Err(ConfigError::Invalid("argon2_iterations must be at least 1".into()));
        }
        Ok(self)
    }
}

/// Loads `.env`, then [`DEFAULT_CONFIG_FILE`] if present, then the environment.
///
/// Also returns the path of the `.env` file that was read, if any, so the
/// caller can log it once logging is up.
pub fn load() -> Result<(MarketConfig, Option<PathBuf>), ConfigError> {
    let dotenv = dotenvy::dotenv().ok();
    let config = load_from(Path::new(DEFAULT_CONFIG_FILE))?;
    Ok((config, dotenv))
}

/// Loads from an explicit file (optional on disk) plus the environment.
pub fn load_from(path: &Path) -> Result<MarketConfig, ConfigError> {
    let settings = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<MarketConfig>()?.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_from(Path::new("/nonexistent/rusty-market.toml")).unwrap();
        assert_eq!(cfg.starting_balance, 5_000_000);
        assert_eq!(cfg.session_ttl_days, 7);
        assert_eq!(cfg.sale_retention_hours, 24);
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert!(cfg.password_pepper.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let file = write_config(
            r#"
starting_balance = 1000
sweep_interval_secs = 5
log_format = "json"
password_pepper = "s3cret"
fixtures_path = "fixtures/seed.json"
"#,
        );
        let cfg = load_from(file.path()).unwrap();
        assert_eq!(cfg.starting_balance, 1000);
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(5));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(
            cfg.password_pepper.as_ref().map(|s| s.expose_secret().to_string()),
            Some("s3cret".to_string())
        );
        assert_eq!(cfg.fixtures_path, Some(PathBuf::from("fixtures/seed.json")));
        assert_eq!(cfg.session_ttl_days, 7);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let file = write_config("session_ttl_days = 0\n");
        assert!(matches!(load_from(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn durations_are_capped() {
        let file = write_config("session_ttl_days = 4294967295\n");
        assert!(matches!(load_from(file.path()), Err(ConfigError::Invalid(_))));
        let file = write_config("sale_retention_hours = 8761\n");
        assert!(matches!(load_from(file.path()), Err(ConfigError::Invalid(_))));

        let file = write_config("session_ttl_days = 365\nsale_retention_hours = 8760\n");
        let cfg = load_from(file.path()).unwrap();
        assert_eq!(cfg.session_ttl_days, MAX_SESSION_TTL_DAYS);
        assert_eq!(cfg.sale_retention_hours, MAX_SALE_RETENTION_HOURS);
    }

    #[test]
    fn pepper_is_redacted_in_debug() {
        let file = write_config("password_pepper = \"do-not-print\"\n");
        let cfg = load_from(file.path()).unwrap();
        assert!(!format!("{cfg:?}").contains("do-not-print"));
    }
}
