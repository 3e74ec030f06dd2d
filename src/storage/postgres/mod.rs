mod blocks;
mod events;
mod headers;

pub use events::PostgresEventRepository;

use alloy_primitives::B256;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::models::common::DatabaseConfig;
use crate::models::datasets::events::{EventModel, TransformerConfig};
use crate::models::errors::StorageError;

/// Postgres-backed header ledger, checked flags and block tables for one node.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    node_fingerprint: String,
}

impl PostgresStore {
    pub async fn connect(
        config: &DatabaseConfig,
        node_fingerprint: impl Into<String>,
    ) -> Result<Self, StorageError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await?;

        info!("Database connection pool established");

        Ok(Self::from_pool(pool, node_fingerprint))
    }

    pub fn from_pool(pool: PgPool, node_fingerprint: impl Into<String>) -> Self {
        Self {
            pool,
            node_fingerprint: node_fingerprint.into(),
        }
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Event repository writing `M` rows to the transformer's table, created on first
    /// use.
    pub async fn event_repository<M: EventModel>(
        &self,
        config: &TransformerConfig,
    ) -> Result<PostgresEventRepository<M>, StorageError> {
        let table = config
            .table_name
            .clone()
            .unwrap_or_else(|| config.checked_column_name.to_lowercase());
        let repository = PostgresEventRepository::new(
            self.clone(),
            &table,
            config.checked_column_name.clone(),
        )?;
        repository.ensure_table().await?;
        Ok(repository)
    }
}

pub(crate) fn parse_hash(value: &str) -> Result<B256, StorageError> {
    value
        .parse()
        .map_err(|e| StorageError::Serialization(format!("invalid hash {value}: {e}")))
}

// Postgres BIGINT is signed
pub(crate) fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
