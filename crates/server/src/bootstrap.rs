use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use haggle_core::config::{AppConfig, ConfigError, LoadOptions};
use haggle_core::lifecycle::{LifecyclePolicy, NegotiationLifecycle};
use haggle_db::{
    connect_with_settings, migrations, DbPool, NegotiationRepository, ProductRepository,
    SqlNegotiationRepository, SqlProductRepository,
};
use thiserror::Error;
use tracing::info;

use crate::api::{self, ApiState};
use crate::health;
use crate::identity::IdentityResolver;
use crate::service::NegotiationService;
use crate::sweeper::ExpirationSweeper;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: NegotiationService,
    pub sweeper: ExpirationSweeper,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let negotiations: Arc<dyn NegotiationRepository> =
        Arc::new(SqlNegotiationRepository::new(db_pool.clone()));
    let products: Arc<dyn ProductRepository> = Arc::new(SqlProductRepository::new(db_pool.clone()));
    let lifecycle = NegotiationLifecycle::new(LifecyclePolicy::from_config(&config.negotiation));
    let store_timeout = Duration::from_secs(config.sweeper.store_timeout_secs);

    info!(
        event_name = "system.bootstrap.policy_loaded",
        correlation_id = "bootstrap",
        max_attempts = lifecycle.policy().max_attempts,
        expiration_window_secs = lifecycle.policy().expiration_window.num_seconds(),
        "negotiation policy loaded"
    );

    let service = NegotiationService::new(negotiations.clone(), products, lifecycle.clone())
        .with_store_timeout(store_timeout);
    let sweeper = ExpirationSweeper::new(negotiations, lifecycle, &config.sweeper);

    Ok(Application { config, db_pool, service, sweeper })
}

impl Application {
    pub fn router(&self) -> Router {
        let identity = IdentityResolver::new(self.config.auth.employee_token.clone());
        api::router(ApiState::new(self.service.clone(), identity))
            .merge(health::router(self.db_pool.clone()))
    }
}
