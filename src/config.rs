use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::context::{Collaborators, ServiceEndpoint};
use crate::events::{DeliveryMode, EventBusConfig, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Memory,
    Postgres,
}

impl FromStr for DatabaseBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(anyhow!(
                "DATABASE_BACKEND must be 'memory' or 'postgres', got '{other}'"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDelivery {
    Inline,
    Queued,
}

impl FromStr for EventDelivery {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "queued" => Ok(Self::Queued),
            other => Err(anyhow!(
                "EVENT_DELIVERY must be 'inline' or 'queued', got '{other}'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub database_backend: DatabaseBackend,
    pub database_url: Option<String>,
    pub replica_database_url: Option<String>,
    pub db_max_connections: u32,
    pub event_delivery: EventDelivery,
    pub event_queue_capacity: usize,
    pub event_workers: usize,
    pub event_max_attempts: u32,
    pub event_retry_base_ms: u64,
    pub event_retry_max_ms: u64,
    pub event_dead_letter_capacity: usize,
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub profile_service_uri: String,
    pub notification_service_uri: String,
    pub partition_service_uri: String,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but with an explicit dotenv file.
    pub fn from_env_file(path: &Path) -> Result<Self> {
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = var("PORT", "7020");
        let port = port
            .trim()
            .trim_start_matches(':')
            .parse::<u16>()
            .context("PORT must be a valid u16")?;

        let config = Self {
            service_name: var("SERVICE_NAME", "record_service"),
            host: var("HTTP_HOST", "0.0.0.0"),
            port,
            database_backend: var("DATABASE_BACKEND", "memory").parse::<DatabaseBackend>()?,
            database_url: optional("DATABASE_URL"),
            replica_database_url: optional("REPLICA_DATABASE_URL"),
            db_max_connections: var("DB_MAX_CONNECTIONS", "10")
                .parse::<u32>()
                .context("DB_MAX_CONNECTIONS must be a valid u32")?,
            event_delivery: var("EVENT_DELIVERY", "queued").parse::<EventDelivery>()?,
            event_queue_capacity: var("EVENT_QUEUE_CAPACITY", "1024")
                .parse::<usize>()
                .context("EVENT_QUEUE_CAPACITY must be a valid usize")?,
            event_workers: var("EVENT_WORKERS", "4")
                .parse::<usize>()
                .context("EVENT_WORKERS must be a valid usize")?,
            event_max_attempts: var("EVENT_MAX_ATTEMPTS", "5")
                .parse::<u32>()
                .context("EVENT_MAX_ATTEMPTS must be a valid u32")?,
            event_retry_base_ms: var("EVENT_RETRY_BASE_MS", "100")
                .parse::<u64>()
                .context("EVENT_RETRY_BASE_MS must be a valid u64")?,
            event_retry_max_ms: var("EVENT_RETRY_MAX_MS", "5000")
                .parse::<u64>()
                .context("EVENT_RETRY_MAX_MS must be a valid u64")?,
            event_dead_letter_capacity: var("EVENT_DEAD_LETTER_CAPACITY", "1000")
                .parse::<usize>()
                .context("EVENT_DEAD_LETTER_CAPACITY must be a valid usize")?,
            jwt_secret: optional("OAUTH2_JWT_SECRET"),
            jwt_issuer: optional("OAUTH2_ISSUER"),
            profile_service_uri: var("PROFILE_SERVICE_URI", "127.0.0.1:7005"),
            notification_service_uri: var("NOTIFICATION_SERVICE_URI", "127.0.0.1:7005"),
            partition_service_uri: var("PARTITION_SERVICE_URI", "127.0.0.1:7003"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_backend == DatabaseBackend::Postgres && self.database_url.is_none() {
            bail!("DATABASE_URL is required when DATABASE_BACKEND=postgres");
        }
        if self.database_backend == DatabaseBackend::Memory && self.replica_database_url.is_some() {
            bail!("REPLICA_DATABASE_URL is only supported with DATABASE_BACKEND=postgres");
        }
        if self.db_max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be greater than zero");
        }
        if self.event_max_attempts == 0 {
            bail!("EVENT_MAX_ATTEMPTS must be greater than zero");
        }
        if self.event_delivery == EventDelivery::Queued
            && (self.event_queue_capacity == 0 || self.event_workers == 0)
        {
            bail!("EVENT_QUEUE_CAPACITY and EVENT_WORKERS must be greater than zero");
        }
        if self.event_retry_base_ms > self.event_retry_max_ms {
            bail!("EVENT_RETRY_BASE_MS must not exceed EVENT_RETRY_MAX_MS");
        }
        Ok(())
    }

    pub fn event_bus_config(&self) -> EventBusConfig {
        let delivery = match self.event_delivery {
            EventDelivery::Inline => DeliveryMode::Inline,
            EventDelivery::Queued => DeliveryMode::Queued {
                capacity: self.event_queue_capacity,
                workers: self.event_workers,
            },
        };
        EventBusConfig {
            delivery,
            retry: RetryPolicy {
                max_attempts: self.event_max_attempts,
                base_delay: Duration::from_millis(self.event_retry_base_ms),
                max_delay: Duration::from_millis(self.event_retry_max_ms),
            },
            dead_letter_capacity: self.event_dead_letter_capacity,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            profile: ServiceEndpoint::new("profile", &self.profile_service_uri),
            partition: ServiceEndpoint::new("partition", &self.partition_service_uri),
            notification: ServiceEndpoint::new("notification", &self.notification_service_uri),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
