//! Server configuration loaded from environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use messaging::BusSettings;

/// Configuration could not be read from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `text` or `json`, got `{other}`")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `0.0.0.0`) and `PORT` (default `3000`)
/// - `RUST_LOG` tracing filter (default `info`) and `LOG_FORMAT` (`text` or `json`)
/// - `DATABASE_URL`; when unset every store and the bus live in memory
/// - `DATABASE_MAX_CONNECTIONS` (default `5`)
/// - `BUS_MAX_DELIVERY_ATTEMPTS`, `BUS_REDELIVERY_DELAY_MS`,
///   `BUS_VISIBILITY_TIMEOUT_MS` and `BUS_POLL_INTERVAL_MS`
/// - `BCRYPT_COST` (default bcrypt cost)
///
/// Empty variables count as unset. Anything else that fails to parse is an
/// error rather than a silent default.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bus: BusSettings,
    pub bus_poll_interval: Duration,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let vars = Vars(lookup);

        let bcrypt_cost = vars.parse("BCRYPT_COST", defaults.bcrypt_cost)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
                reason: "must be between 4 and 31".into(),
            });
        }

        Ok(Self {
            host: vars.get("HOST").unwrap_or(defaults.host),
            port: vars.parse("PORT", defaults.port)?,
            log_level: vars.get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: vars.parse("LOG_FORMAT", defaults.log_format)?,
            database_url: vars.get("DATABASE_URL"),
            database_max_connections: vars
                .parse("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            bus: BusSettings {
                max_delivery_attempts: vars.parse(
                    "BUS_MAX_DELIVERY_ATTEMPTS",
                    defaults.bus.max_delivery_attempts,
                )?,
                redelivery_delay: vars
                    .millis("BUS_REDELIVERY_DELAY_MS", defaults.bus.redelivery_delay)?,
                visibility_timeout: vars
                    .millis("BUS_VISIBILITY_TIMEOUT_MS", defaults.bus.visibility_timeout)?,
            },
            bus_poll_interval: vars.millis("BUS_POLL_INTERVAL_MS", defaults.bus_poll_interval)?,
            bcrypt_cost,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_database(&self) -> bool {
        self.database_url.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            bus: BusSettings::default(),
            bus_poll_interval: Duration::from_millis(250),
            bcrypt_cost: application::BcryptHasher::default().cost(),
        }
    }
}

// The database URL carries credentials.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("database_max_connections", &self.database_max_connections)
            .field("bus", &self.bus)
            .field("bus_poll_interval", &self.bus_poll_interval)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => {
                let parsed = value.trim().parse::<T>();
                parsed.map_err(|err| ConfigError::Invalid {
                    key,
                    reason: err.to_string(),
                    value,
                })
            }
        }
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default_ms).map(Duration::from_millis)
    }
}
