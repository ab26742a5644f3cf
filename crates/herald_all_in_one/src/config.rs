use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use delivery_worker::{DeliveryWorkerConfig, RetryPolicy, WebhookClientConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // Delivery worker configuration
    /// Concurrent webhook attempts
    #[serde(default = "default_delivery_worker_count")]
    pub delivery_worker_count: usize,

    /// Waiting tasks per priority lane
    #[serde(default = "default_delivery_queue_capacity")]
    pub delivery_queue_capacity: usize,

    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    #[serde(default = "default_delivery_backoff_base_secs")]
    pub delivery_backoff_base_secs: u64,

    #[serde(default = "default_delivery_max_backoff_secs")]
    pub delivery_max_backoff_secs: u64,

    /// Delay after a persistence failure around an attempt
    #[serde(default = "default_delivery_internal_retry_delay_secs")]
    pub delivery_internal_retry_delay_secs: u64,

    #[serde(default = "default_delivery_max_internal_retries")]
    pub delivery_max_internal_retries: u32,

    /// Reschedule pending webhook deliveries at startup
    #[serde(default = "default_delivery_recover_on_startup")]
    pub delivery_recover_on_startup: bool,

    /// Seconds between sweeps for pending deliveries missing from the
    /// queue; 0 disables the sweep
    #[serde(default = "default_delivery_recovery_interval_secs")]
    pub delivery_recovery_interval_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    /// Seconds the closers get to flush on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "herald".to_string()
}

fn default_postgres_username() -> String {
    "herald".to_string()
}

fn default_postgres_password() -> String {
    "herald".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "crates/herald_all_in_one/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_delivery_worker_count() -> usize {
    8
}

fn default_delivery_queue_capacity() -> usize {
    1024
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_delivery_backoff_base_secs() -> u64 {
    2
}

fn default_delivery_max_backoff_secs() -> u64 {
    3600
}

fn default_delivery_internal_retry_delay_secs() -> u64 {
    60
}

fn default_delivery_max_internal_retries() -> u32 {
    5
}

fn default_delivery_recover_on_startup() -> bool {
    true
}

fn default_delivery_recovery_interval_secs() -> u64 {
    60
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "herald".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("HERALD"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otlp_endpoint: self.otel_enabled.then(|| self.otel_endpoint.clone()),
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn webhook_client_config(&self) -> WebhookClientConfig {
        WebhookClientConfig {
            timeout: Duration::from_secs(self.webhook_timeout_secs),
        }
    }

    pub fn delivery_worker_config(&self) -> DeliveryWorkerConfig {
        DeliveryWorkerConfig {
            worker_count: self.delivery_worker_count,
            queue_capacity: self.delivery_queue_capacity,
            recover_on_startup: self.delivery_recover_on_startup,
            recovery_interval: (self.delivery_recovery_interval_secs > 0)
                .then(|| Duration::from_secs(self.delivery_recovery_interval_secs)),
            retry_policy: RetryPolicy {
                backoff_base: Duration::from_secs(self.delivery_backoff_base_secs),
                max_backoff: Duration::from_secs(self.delivery_max_backoff_secs),
                internal_retry_delay: Duration::from_secs(self.delivery_internal_retry_delay_secs),
                max_internal_retries: self.delivery_max_internal_retries,
            },
        }
    }
}
