use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ConnError, PoolError};

pub const DEFAULT_PORT: u16 = 1433;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection target: server address, credentials and an options bag.
///
/// Deserializes from the usual camelCase JSON shape:
/// ```rust
/// use mssql_middleware::Config;
///
/// let config: Config = serde_json::from_str(r#"{
///     "server": "db.example.net",
///     "userName": "app",
///     "password": "secret",
///     "options": { "database": "orders", "encrypt": true, "requestTimeout": 30000 }
/// }"#).unwrap();
/// assert_eq!(config.options.database.as_deref(), Some("orders"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub server: String,
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub options: ConnectOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_encrypt")]
    pub encrypt: bool,
    #[serde(default)]
    pub instance_name: Option<String>,
    /// Upper bound for one statement, in milliseconds on the wire format.
    #[serde(default, with = "millis")]
    pub request_timeout: Option<Duration>,
    #[serde(default, with = "millis")]
    pub connect_timeout: Option<Duration>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub trust_server_certificate: bool,
    #[serde(default)]
    pub app_name: Option<String>,
    /// Driver-specific keys, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

fn default_encrypt() -> bool {
    true
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            database: None,
            encrypt: default_encrypt(),
            instance_name: None,
            request_timeout: None,
            connect_timeout: None,
            port: None,
            trust_server_certificate: false,
            app_name: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new(server: String, user_name: String, password: String) -> Self {
        Self {
            server,
            user_name,
            password,
            options: ConnectOptions::default(),
        }
    }

    #[must_use]
    pub fn builder(server: String, user_name: String, password: String) -> ConfigBuilder {
        ConfigBuilder::new(server, user_name, password)
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.options.port.unwrap_or(DEFAULT_PORT)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.options.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.options.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Check the parts every driver needs.
    ///
    /// # Errors
    /// Returns `ConnError::Config` if the server address is empty.
    pub fn validate(&self) -> Result<(), ConnError> {
        if self.server.trim().is_empty() {
            return Err(ConnError::Config("server must not be empty".into()));
        }
        Ok(())
    }
}

/// Fluent builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new(server: String, user_name: String, password: String) -> Self {
        Self {
            config: Config::new(server, user_name, password),
        }
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.options.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.config.options.encrypt = encrypt;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: Option<String>) -> Self {
        self.config.options.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.config.options.port = port;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.options.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.options.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.config.options.trust_server_certificate = trust;
        self
    }

    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.options.app_name = Some(app_name.into());
        self
    }

    /// Pass a driver-specific option through unchanged.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.config.options.extra.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

/// Backoff schedule for the reset loop of a disconnected handle.
///
/// Attempts are unbounded; only the delay between them is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RecoveryPolicy {
    /// Retry without delay, only yielding to the scheduler between attempts.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.multiplier.max(1))
            .min(self.max_backoff)
    }
}

/// Pool sizing and recovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of handles, all connected eagerly.
    pub size: usize,
    pub recovery: RecoveryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 10,
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    /// # Errors
    /// Returns `PoolError::Configuration` for a zero-sized pool or a backoff
    /// whose cap is below its starting delay.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.size == 0 {
            return Err(PoolError::Configuration(
                "pool size must be greater than 0".into(),
            ));
        }
        if self.recovery.max_backoff < self.recovery.initial_backoff {
            return Err(PoolError::Configuration(
                "max_backoff cannot be less than initial_backoff".into(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
