mod config;

use std::sync::Arc;
use std::time::Duration;

use calliq_api::{AuditService, CleanupOldLogsRequest};
use common::auth::{OrgRole, RoleAccessEvaluator, UserContext};
use common::domain::OrganizationRepository;
use common::postgres::{
    PostgresAuditLogRepository, PostgresClient, PostgresFeatureCatalogRepository,
    PostgresFeatureToggleRepository, PostgresOrganizationRepository,
};
use common::telemetry::{init_telemetry, TelemetryConfig};
use config::ServiceConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_telemetry(&TelemetryConfig {
        service_name: "calliq-all-in-one".to_string(),
        log_level: config.log_level.clone(),
        json_output: config.log_json,
    });

    info!("Starting calliq-all-in-one service");

    if let Err(e) = run(config).await {
        error!("Service failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let postgres_client = PostgresClient::new(
        &config.postgres_host,
        config.postgres_port,
        &config.postgres_database,
        &config.postgres_username,
        &config.postgres_password,
        config.postgres_pool_size,
    )?;
    postgres_client.ping().await?;
    info!("PostgreSQL connection established");

    let organization_repo = Arc::new(PostgresOrganizationRepository::new(postgres_client.clone()));
    let toggle_repo = Arc::new(PostgresFeatureToggleRepository::new(postgres_client.clone()));
    let catalog_repo = Arc::new(PostgresFeatureCatalogRepository::new(postgres_client.clone()));
    let audit_repo = Arc::new(PostgresAuditLogRepository::new(postgres_client));

    let evaluator = Arc::new(RoleAccessEvaluator::new(
        organization_repo.clone(),
        toggle_repo,
        catalog_repo,
    ));
    let audit_service = Arc::new(AuditService::new(audit_repo, evaluator));

    let shutdown_token = CancellationToken::new();
    let sweeper = tokio::spawn(run_retention_sweeper(
        audit_service,
        organization_repo,
        config.audit_sweep_interval_secs,
        config.audit_retention_days,
        shutdown_token.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping service");
    shutdown_token.cancel();
    sweeper.await?;

    info!("Service stopped gracefully");
    Ok(())
}

/// Periodically purges audit entries older than the retention window for
/// every organization. One failing organization never stops the sweep.
async fn run_retention_sweeper(
    audit_service: Arc<AuditService>,
    organizations: Arc<PostgresOrganizationRepository>,
    interval_secs: u64,
    retention_days: i64,
    shutdown_token: CancellationToken,
) {
    let interval = Duration::from_secs(interval_secs);
    let system_user = UserContext::new("system", None, OrgRole::SystemAdmin);

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!("Retention sweeper stopping");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                sweep(&audit_service, organizations.as_ref(), &system_user, retention_days).await;
            }
        }
    }
}

async fn sweep(
    audit_service: &AuditService,
    organizations: &PostgresOrganizationRepository,
    system_user: &UserContext,
    retention_days: i64,
) {
    let organization_ids = match organizations.list_organization_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Retention sweep could not list organizations: {}", e);
            return;
        }
    };

    let mut total_deleted = 0u64;
    for organization_id in organization_ids {
        match audit_service
            .cleanup_old_logs(CleanupOldLogsRequest {
                user: system_user.clone(),
                organization_id: organization_id.clone(),
                retention_days,
            })
            .await
        {
            Ok(deleted) => total_deleted += deleted,
            Err(e) => {
                warn!(organization_id = %organization_id, "Retention cleanup failed: {}", e);
            }
        }
    }

    info!(total_deleted, "Retention sweep finished");
}
