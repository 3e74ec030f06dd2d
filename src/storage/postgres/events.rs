use async_trait::async_trait;
use std::marker::PhantomData;

use crate::models::datasets::events::EventModel;
use crate::models::datasets::headers::Header;
use crate::models::errors::StorageError;
use crate::storage::postgres::headers::mark_checked;
use crate::storage::postgres::{PostgresStore, to_db_int};
use crate::storage::{CheckedHeaderRepository, validate_identifier};
use crate::transformer::EventRepository;

/// Event rows for one transformer. Models are stored as JSONB next to the raw log,
/// keyed by (header_id, transaction_index, log_index).
pub struct PostgresEventRepository<M> {
    store: PostgresStore,
    table: String,
    event_kind: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: EventModel> PostgresEventRepository<M> {
    pub fn new(
        store: PostgresStore,
        table: &str,
        event_kind: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let table = validate_identifier(table)?.to_string();
        Ok(Self {
            store,
            table,
            event_kind: event_kind.into(),
            _model: PhantomData,
        })
    }

    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id                BIGSERIAL PRIMARY KEY,
                header_id         BIGINT NOT NULL REFERENCES headers (id) ON DELETE CASCADE,
                transaction_index BIGINT NOT NULL,
                log_index         BIGINT NOT NULL,
                payload           JSONB  NOT NULL,
                raw_log           JSONB  NOT NULL,
                UNIQUE (header_id, transaction_index, log_index)
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl).execute(&self.store.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl<M: EventModel> EventRepository for PostgresEventRepository<M> {
    type Model = M;

    async fn create(&self, header_id: i64, models: &[M]) -> Result<(), StorageError> {
        if models.is_empty() {
            return Err(StorageError::EmptyModels { header_id });
        }

        let upsert = format!(
            r#"
            INSERT INTO {table} (header_id, transaction_index, log_index, payload, raw_log)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (header_id, transaction_index, log_index) DO UPDATE SET
                payload = EXCLUDED.payload,
                raw_log = EXCLUDED.raw_log
            "#,
            table = self.table
        );

        let mut tx = self.store.pool.begin().await?;

        for model in models {
            let key = model.key();
            sqlx::query(&upsert)
                .bind(key.header_id)
                .bind(to_db_int(key.transaction_index))
                .bind(to_db_int(key.log_index))
                .bind(serde_json::to_value(model)?)
                .bind(serde_json::to_value(model.raw_log())?)
                .execute(&mut *tx)
                .await?;
        }

        mark_checked(&mut *tx, header_id, &self.event_kind).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn missing_headers(&self, start: u64, end: Option<u64>) -> Result<Vec<Header>, StorageError> {
        self.store.missing_headers(start, end, &self.event_kind).await
    }

    async fn mark_header_checked(&self, header_id: i64) -> Result<(), StorageError> {
        self.store
            .mark_header_checked(header_id, &self.event_kind)
            .await
    }
}
