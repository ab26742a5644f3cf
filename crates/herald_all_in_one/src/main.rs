mod config;

use common::postgres::{
    PostgresClient, PostgresConfig, PostgresDeviceRepository, PostgresGroupRepository,
    PostgresInboxRepository, PostgresMessageRepository, PostgresOwnerRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use crate::config::ServiceConfig;
use delivery_worker::{DeliveryWorker, ReqwestWebhookClient};
use goose::MigrationRunner;
use herald_runner::Runner;
use routing_engine::{RoutingEngine, RoutingEngineDeps};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Runs migrations, seeds the default groups and hosts the delivery worker.
///
/// The binary has no ingress of its own. `RoutingEngine` is the surface an
/// embedding API layer calls into for submission, inbox reads and
/// acknowledgements; here it is only used for seeding and is held until
/// shutdown alongside the worker whose queue it schedules into.
#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting herald-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let repos = match initialize_postgres(&config.postgres_config()).await {
        Ok(repos) => repos,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            std::process::exit(1);
        }
    };

    let webhook_client = match ReqwestWebhookClient::new(config.webhook_client_config()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build webhook client: {:#}", e);
            std::process::exit(1);
        }
    };

    let delivery_worker = DeliveryWorker::new(
        repos.inbox.clone(),
        webhook_client,
        config.delivery_worker_config(),
    );

    let routing_engine = RoutingEngine::new(RoutingEngineDeps {
        device_repository: repos.device,
        group_repository: repos.group,
        owner_repository: repos.owner,
        message_repository: repos.message,
        inbox_repository: repos.inbox,
        delivery_scheduler: delivery_worker.scheduler(),
    });

    if let Err(e) = routing_engine.group_seeder.ensure_default_groups().await {
        error!("Failed to seed default groups: {}", e);
        std::process::exit(1);
    }
    info!("Routing engine ready");

    Runner::new()
        .with_named_process("delivery_worker", delivery_worker.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            drop(routing_engine);
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;
}

struct PostgresRepositories {
    device: Arc<PostgresDeviceRepository>,
    group: Arc<PostgresGroupRepository>,
    owner: Arc<PostgresOwnerRepository>,
    message: Arc<PostgresMessageRepository>,
    inbox: Arc<PostgresInboxRepository>,
}

async fn initialize_postgres(config: &PostgresConfig) -> anyhow::Result<PostgresRepositories> {
    info!("Initializing PostgreSQL...");
    MigrationRunner::new(
        config.goose_binary_path.clone(),
        config.migrations_dir.clone(),
        "postgres".to_string(),
        config.goose_dsn(),
    )
    .run_migrations()
    .await?;

    let client = PostgresClient::from_config(config)?;
    client.ping().await?;

    Ok(PostgresRepositories {
        device: Arc::new(PostgresDeviceRepository::new(client.clone())),
        group: Arc::new(PostgresGroupRepository::new(client.clone())),
        owner: Arc::new(PostgresOwnerRepository::new(client.clone())),
        message: Arc::new(PostgresMessageRepository::new(client.clone())),
        inbox: Arc::new(PostgresInboxRepository::new(client)),
    })
}
