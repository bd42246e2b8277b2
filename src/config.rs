//! Configuration module
//!
//! Loads configuration from environment variables. This is the only place
//! the process environment is read; everything else receives a `Config`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::Environment;

/// Where a capability lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendUrl {
    /// In-process backend (local deployments and tests)
    Memory,
    /// Postgres database URL
    Postgres(String),
}

impl BackendUrl {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendUrl::Memory => "memory",
            BackendUrl::Postgres(_) => "postgres",
        }
    }
}

impl FromStr for BackendUrl {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("memory") || s.starts_with("memory://") {
            Ok(BackendUrl::Memory)
        } else if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(BackendUrl::Postgres(s.to_string()))
        } else {
            Err(())
        }
    }
}

/// How the secondary payment store is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    /// Await the secondary write before returning (failure still non-fatal)
    Inline,
    /// Spawn the secondary write and return as soon as the primary succeeds
    Background,
}

impl FromStr for ReplicationMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(ReplicationMode::Inline),
            "background" => Ok(ReplicationMode::Background),
            _ => Err(()),
        }
    }
}

/// What the payment workflow does with an already-applied deduction when the
/// primary store write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailurePolicy {
    /// Leave the deduction in place and report the gap in the logs
    Keep,
    /// Re-credit the deducted amount before surfacing the error
    Refund,
}

impl FromStr for StoreFailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(StoreFailurePolicy::Keep),
            "refund" => Ok(StoreFailurePolicy::Refund),
            _ => Err(()),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Active deployment
    pub environment: Environment,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Ledger backend
    pub balance_store: BackendUrl,

    /// Primary payment store; `None` makes every payment fail with a
    /// configuration error
    pub primary_store: Option<BackendUrl>,

    /// Best-effort replica payment store
    pub secondary_store: Option<BackendUrl>,

    /// Active environment's queue
    pub queue: BackendUrl,

    /// Other environment's queue, target of replayed events
    pub replay_queue: Option<BackendUrl>,

    /// Channel carrying PAYMENT_INITIATED events
    pub payment_channel: String,

    /// Channel reserved for replay traffic
    pub replay_channel: String,

    pub replication_mode: ReplicationMode,

    pub store_failure_policy: StoreFailurePolicy,

    /// Maximum connections per database pool
    pub database_max_connections: u32,

    /// Optimistic-lock retries per balance update
    pub ledger_max_retries: u32,

    /// Concurrent relay tasks
    pub relay_max_in_flight: usize,

    /// Idle sleep between empty receives
    pub queue_poll_interval: Duration,

    /// Visibility timeout for received but unacknowledged messages
    pub queue_lease: Duration,

    /// Run the relay inside the API process
    pub embedded_relay: bool,

    /// Build identifier shown on the welcome route
    pub commit_sha: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment: Environment = parse_or(&var, "ENVIRONMENT", Environment::Local)?;

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&var, "PORT", 3000u16)?;

        let balance_store = backend_or(&var, "BALANCE_STORE_URL", Some(BackendUrl::Memory))?
            .ok_or(ConfigError::MissingEnv("BALANCE_STORE_URL"))?;

        // Only local deployments fall back to an in-memory primary store.
        let primary_default = match environment {
            Environment::Local => Some(BackendUrl::Memory),
            _ => None,
        };
        let primary_store = backend_or(&var, "PRIMARY_STORE_URL", primary_default)?;
        let secondary_store = backend_or(&var, "SECONDARY_STORE_URL", None)?;

        let queue = backend_or(&var, "QUEUE_URL", Some(BackendUrl::Memory))?
            .ok_or(ConfigError::MissingEnv("QUEUE_URL"))?;
        // The replay queue belongs to the peer environment; an in-process
        // queue would have no consumer.
        let replay_queue = backend_or(&var, "REPLAY_QUEUE_URL", None)?;
        if replay_queue == Some(BackendUrl::Memory) {
            return Err(ConfigError::InvalidValue("REPLAY_QUEUE_URL"));
        }

        let payment_channel = var("PAYMENT_CHANNEL").unwrap_or_else(|| "payment-events".to_string());
        let replay_channel = var("REPLAY_CHANNEL").unwrap_or_else(|| "replay-queue".to_string());

        if payment_channel == replay_channel {
            return Err(ConfigError::InvalidValue("REPLAY_CHANNEL"));
        }

        let replication_mode = parse_or(&var, "REPLICATION_MODE", ReplicationMode::Background)?;
        let store_failure_policy =
            parse_or(&var, "STORE_FAILURE_POLICY", StoreFailurePolicy::Keep)?;

        let database_max_connections = parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10u32)?;
        let ledger_max_retries = parse_or(&var, "LEDGER_MAX_RETRIES", 3u32)?;
        if ledger_max_retries == 0 {
            return Err(ConfigError::InvalidValue("LEDGER_MAX_RETRIES"));
        }

        let relay_max_in_flight = parse_or(&var, "RELAY_MAX_IN_FLIGHT", 16usize)?;
        if relay_max_in_flight == 0 {
            return Err(ConfigError::InvalidValue("RELAY_MAX_IN_FLIGHT"));
        }

        let queue_poll_interval =
            Duration::from_millis(parse_or(&var, "QUEUE_POLL_INTERVAL_MS", 500u64)?);
        let queue_lease = Duration::from_secs(parse_or(&var, "QUEUE_LEASE_SECS", 30u64)?);
        let embedded_relay = parse_or(&var, "EMBEDDED_RELAY", false)?;
        let commit_sha = var("COMMIT_SHA");

        Ok(Self {
            environment,
            host,
            port,
            balance_store,
            primary_store,
            secondary_store,
            queue,
            replay_queue,
            payment_channel,
            replay_channel,
            replication_mode,
            store_failure_policy,
            database_max_connections,
            ledger_max_retries,
            relay_max_in_flight,
            queue_poll_interval,
            queue_lease,
            embedded_relay,
            commit_sha,
        })
    }

    /// Configuration for tests and local runs: everything in memory.
    pub fn local() -> Self {
        Self::from_lookup(|_| None).expect("defaults are valid")
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

fn backend_or<F>(
    var: &F,
    key: &'static str,
    default: Option<BackendUrl>,
) -> Result<Option<BackendUrl>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
