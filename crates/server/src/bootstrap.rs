use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use vitrine_core::config::{AppConfig, ConfigError, LoadOptions};
use vitrine_core::{CatalogStore, DiscoveryEngine, InteractionStore};
use vitrine_db::{connect_with_settings, migrations, DbPool, SqlCatalogStore, SqlInteractionStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<DiscoveryEngine>,
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
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let catalog: Arc<dyn CatalogStore> = Arc::new(SqlCatalogStore::new(db_pool.clone()));
    let interactions: Arc<dyn InteractionStore> =
        Arc::new(SqlInteractionStore::new(db_pool.clone()));
    let engine = Arc::new(DiscoveryEngine::new(catalog, interactions));

    Ok(Application { config, db_pool, engine })
}

#[cfg(test)]
mod tests {
    use vitrine_core::config::{ConfigOverrides, LoadOptions};
    use vitrine_core::{PageRequest, TimeRange, UserId};

    use crate::bootstrap::bootstrap;

    fn memory_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_an_unsupported_database_url() {
        let result = bootstrap(memory_options("postgres://localhost/vitrine")).await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_wires_the_engine_over_a_migrated_schema() {
        let app = bootstrap(memory_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('categories', 'products', 'purchases', 'favorites', 'product_views')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected catalog tables after bootstrap");
        assert_eq!(table_count, 5);

        // Engine answers through the real stores on the empty catalog.
        let page = app
            .engine
            .trending(TimeRange::Month, PageRequest::default())
            .await
            .expect("trending on empty catalog");
        assert!(page.data.is_empty());

        let cold = app
            .engine
            .personalized(UserId(7), PageRequest::default())
            .await
            .expect("personalized cold start");
        assert_eq!(cold.meta.algorithm.as_deref(), Some("trending"));

        app.db_pool.close().await;
    }
}
