use async_trait::async_trait;
use sqlx::PgConnection;

use crate::models::datasets::headers::{Header, HeaderUpsert};
use crate::models::errors::StorageError;
use crate::storage::postgres::{PostgresStore, parse_hash, to_db_int};
use crate::storage::{CheckedHeaderRepository, HeaderRepository};

type HeaderRow = (i64, i64, String, Vec<u8>, i64, String);

fn header_from_row(row: HeaderRow) -> Result<Header, StorageError> {
    let (id, block_number, hash, raw, timestamp, node_fingerprint) = row;
    Ok(Header {
        id,
        block_number: block_number as u64,
        hash: parse_hash(&hash)?,
        raw: raw.into(),
        timestamp: timestamp as u64,
        node_fingerprint,
    })
}

pub(crate) async fn mark_checked(
    conn: &mut PgConnection,
    header_id: i64,
    event_kind: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO checked_headers (header_id, event_kind)
        VALUES ($1, $2)
        ON CONFLICT (header_id, event_kind) DO UPDATE SET checked_at = NOW()
        "#,
    )
    .bind(header_id)
    .bind(event_kind)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl HeaderRepository for PostgresStore {
    async fn create_or_update_header(&self, header: &Header) -> Result<HeaderUpsert, StorageError> {
        let mut tx = self.pool.begin().await?;
        let hash = header.hash.to_string();

        let existing: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, hash FROM headers WHERE block_number = $1 AND node_fingerprint = $2 FOR UPDATE",
        )
        .bind(to_db_int(header.block_number))
        .bind(&header.node_fingerprint)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some((id, stored_hash)) if stored_hash == hash => HeaderUpsert::Unchanged(id),
            Some((id, _)) => {
                // Deleting the row cascades to its checked flags and to every event
                // table, so no rows from the orphaned block survive. The id is reused.
                sqlx::query("DELETE FROM headers WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query(
                    r#"
                    INSERT INTO headers (id, block_number, hash, raw, block_timestamp, node_fingerprint)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(id)
                .bind(to_db_int(header.block_number))
                .bind(&hash)
                .bind(header.raw.to_vec())
                .bind(to_db_int(header.timestamp))
                .bind(&header.node_fingerprint)
                .execute(&mut *tx)
                .await?;

                HeaderUpsert::Replaced(id)
            }
            None => {
                let (id,): (i64,) = sqlx::query_as(
                    r#"
                    INSERT INTO headers (block_number, hash, raw, block_timestamp, node_fingerprint)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id
                    "#,
                )
                .bind(to_db_int(header.block_number))
                .bind(&hash)
                .bind(header.raw.to_vec())
                .bind(to_db_int(header.timestamp))
                .bind(&header.node_fingerprint)
                .fetch_one(&mut *tx)
                .await?;

                HeaderUpsert::Inserted(id)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get_header(&self, block_number: u64) -> Result<Option<Header>, StorageError> {
        let row: Option<HeaderRow> = sqlx::query_as(
            r#"
            SELECT id, block_number, hash, raw, block_timestamp, node_fingerprint
            FROM headers
            WHERE block_number = $1 AND node_fingerprint = $2
            "#,
        )
        .bind(to_db_int(block_number))
        .bind(&self.node_fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        row.map(header_from_row).transpose()
    }

    async fn missing_block_numbers(
        &self,
        start: u64,
        end: u64,
        node_fingerprint: &str,
    ) -> Result<Vec<u64>, StorageError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT series.number
            FROM generate_series($1::BIGINT, $2::BIGINT) AS series(number)
            LEFT JOIN headers h
                ON h.block_number = series.number AND h.node_fingerprint = $3
            WHERE h.id IS NULL
            ORDER BY series.number
            "#,
        )
        .bind(to_db_int(start))
        .bind(to_db_int(end))
        .bind(node_fingerprint)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(number,)| number as u64).collect())
    }
}

#[async_trait]
impl CheckedHeaderRepository for PostgresStore {
    async fn missing_headers(
        &self,
        start: u64,
        end: Option<u64>,
        event_kind: &str,
    ) -> Result<Vec<Header>, StorageError> {
        let rows: Vec<HeaderRow> = sqlx::query_as(
            r#"
            SELECT h.id, h.block_number, h.hash, h.raw, h.block_timestamp, h.node_fingerprint
            FROM headers h
            LEFT JOIN checked_headers c
                ON c.header_id = h.id AND c.event_kind = $3
            WHERE c.header_id IS NULL
              AND h.node_fingerprint = $4
              AND h.block_number >= $1
              AND ($2::BIGINT IS NULL OR h.block_number <= $2)
            ORDER BY h.block_number
            "#,
        )
        .bind(to_db_int(start))
        .bind(end.map(to_db_int))
        .bind(event_kind)
        .bind(&self.node_fingerprint)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(header_from_row).collect()
    }

    async fn mark_header_checked(&self, header_id: i64, event_kind: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        mark_checked(&mut conn, header_id, event_kind).await
    }
}
