//! Postgres-backed record store.
//!
//! All tables share one JSONB table keyed by `(table_name, record_id)`; lookup
//! rows live in `lookup_entities`. Families referenced by participants are
//! ordinary `family` records.

use crate::domain::model::{LookupTable, Record, TableKind};
use crate::storage::{detach, missing_reference, referenced_keys, Detach, RecordStore, RowWrite, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::{HashMap, VecDeque};

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and creates the backing tables if needed.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS submission_records (
                table_name TEXT NOT NULL,
                record_id TEXT NOT NULL,
                record JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (table_name, record_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS lookup_entities (
                lookup_table TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                PRIMARY KEY (lookup_table, natural_key)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn write_row(tx: &mut Transaction<'_, Postgres>, row: &RowWrite) -> Result<(), StoreError> {
        let mut errors = Vec::new();
        for fk in row.table.foreign_keys() {
            let keys = referenced_keys(&row.record, fk.field);
            if keys.is_empty() {
                continue;
            }
            let found: Vec<String> = sqlx::query_scalar(
                "SELECT record_id FROM submission_records WHERE table_name = $1 AND record_id = ANY($2)",
            )
            .bind(fk.target.name())
            .bind(keys.clone())
            .fetch_all(&mut **tx)
            .await?;
            errors.extend(
                keys.iter()
                    .filter(|k| !found.contains(k))
                    .map(|k| missing_reference(&fk, k)),
            );
        }
        if !errors.is_empty() {
            return Err(StoreError::Constraint(errors));
        }

        sqlx::query(
            "INSERT INTO submission_records (table_name, record_id, record, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (table_name, record_id)
             DO UPDATE SET record = EXCLUDED.record, updated_at = EXCLUDED.updated_at",
        )
        .bind(row.table.name())
        .bind(&row.id)
        .bind(Json(&row.record))
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get(&self, table: TableKind, id: &str) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query("SELECT record FROM submission_records WHERE table_name = $1 AND record_id = $2")
            .bind(table.name())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let Json(record): Json<Record> = row.try_get("record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn get_many(&self, table: TableKind, ids: &[String]) -> Result<HashMap<String, Record>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT record_id, record FROM submission_records WHERE table_name = $1 AND record_id = ANY($2)",
        )
        .bind(table.name())
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("record_id")?;
            let Json(record): Json<Record> = row.try_get("record")?;
            found.insert(id, record);
        }
        Ok(found)
    }

    async fn list(&self, table: TableKind) -> Result<Vec<(String, Record)>, StoreError> {
        let rows = sqlx::query(
            "SELECT record_id, record FROM submission_records WHERE table_name = $1 ORDER BY record_id",
        )
        .bind(table.name())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("record_id")?;
            let Json(record): Json<Record> = row.try_get("record")?;
            records.push((id, record));
        }
        Ok(records)
    }

    async fn save_all(&self, rows: &[RowWrite]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            if let Err(e) = Self::write_row(&mut tx, row).await {
                tx.rollback().await?;
                return Err(e);
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_all(&self, keys: &[(TableKind, String)]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut queue: VecDeque<(TableKind, String)> = keys.iter().cloned().collect();
        let mut deleted = 0;
        while let Some((table, id)) = queue.pop_front() {
            let result = sqlx::query("DELETE FROM submission_records WHERE table_name = $1 AND record_id = $2")
                .bind(table.name())
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                continue;
            }
            deleted += result.rows_affected();
            if let Some(index) = table.parent_index() {
                queue.push_back((index, table.index_row_id(&id)));
            }

            for (owner, fk) in table.dependents() {
                let rows = sqlx::query(
                    "SELECT record_id, record FROM submission_records
                     WHERE table_name = $1
                       AND (record ->> $2::text = $3::text OR record -> $2::text @> jsonb_build_array($3::text))",
                )
                .bind(owner.name())
                .bind(fk.field)
                .bind(&id)
                .fetch_all(&mut *tx)
                .await?;

                for row in rows {
                    let child_id: String = row.try_get("record_id")?;
                    let Json(record): Json<Record> = row.try_get("record")?;
                    match detach(&record, fk.field, &id) {
                        Detach::Delete => queue.push_back((owner, child_id)),
                        Detach::Rewrite(updated) => {
                            sqlx::query(
                                "UPDATE submission_records SET record = $3, updated_at = $4
                                 WHERE table_name = $1 AND record_id = $2",
                            )
                            .bind(owner.name())
                            .bind(&child_id)
                            .bind(Json(&updated))
                            .bind(Utc::now())
                            .execute(&mut *tx)
                            .await?;
                        }
                        Detach::Unrelated => {}
                    }
                }
            }
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn get_or_create_lookup(&self, lookup: LookupTable, key: &str) -> Result<String, StoreError> {
        match lookup {
            LookupTable::Family => {
                let mut record = Record::new();
                record.insert(lookup.natural_key_field().to_string(), key.into());
                sqlx::query(
                    "INSERT INTO submission_records (table_name, record_id, record, updated_at)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (table_name, record_id) DO NOTHING",
                )
                .bind(TableKind::Family.name())
                .bind(key)
                .bind(Json(&record))
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            }
            _ => {
                sqlx::query(
                    "INSERT INTO lookup_entities (lookup_table, natural_key) VALUES ($1, $2)
                     ON CONFLICT (lookup_table, natural_key) DO NOTHING",
                )
                .bind(lookup.name())
                .bind(key)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(key.to_string())
    }

    async fn lookup_keys(&self, lookup: LookupTable) -> Result<Vec<String>, StoreError> {
        let keys = match lookup {
            LookupTable::Family => {
                sqlx::query_scalar(
                    "SELECT record_id FROM submission_records WHERE table_name = $1 ORDER BY record_id",
                )
                .bind(TableKind::Family.name())
                .fetch_all(&self.pool)
                .await?
            }
            _ => {
                sqlx::query_scalar(
                    "SELECT natural_key FROM lookup_entities WHERE lookup_table = $1 ORDER BY natural_key",
                )
                .bind(lookup.name())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
