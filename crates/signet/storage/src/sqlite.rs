//! SQLite adapter, the transactional source-of-truth backend.

use crate::traits::{check_signature_uniqueness, ContractStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use signet_types::{
    ArtifactRef, Contract, ContractId, ContractStatus, Field, FieldGeometry, FieldId, FieldKind,
    FieldSpec, FieldValue,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed contract store.
#[derive(Clone)]
pub struct SqliteContractStore {
    pool: SqlitePool,
}

impl SqliteContractStore {
    /// Connect and initialize the schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 5, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect sqlite: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the adapter from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS contracts (
                id TEXT PRIMARY KEY,
                original_artifact TEXT NOT NULL,
                current_artifact TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS fields (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_id TEXT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                width REAL NOT NULL,
                height REAL NOT NULL,
                value_text TEXT,
                value_artifact TEXT
            )
            "#,
            r#"CREATE INDEX IF NOT EXISTS fields_contract_id ON fields(contract_id)"#,
        ];
        for statement in ddl {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    /// Distinguish a lost status race from a missing contract after a
    /// compare-and-swap update touched zero rows.
    async fn stale_error<'e, E>(
        &self,
        executor: E,
        id: &ContractId,
        expected_from: ContractStatus,
    ) -> StorageResult<StorageError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let found: Option<String> = sqlx::query("SELECT status FROM contracts WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(executor)
            .await
            .map_err(backend)?
            .map(|row| row.try_get("status"))
            .transpose()
            .map_err(backend)?;
        Ok(match found {
            Some(found) => StorageError::Conflict(format!(
                "contract {id} moved: expected status {expected_from}, found {found}"
            )),
            None => StorageError::NotFound(format!("contract {id} not found")),
        })
    }
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_contract(row: &SqliteRow) -> StorageResult<Contract> {
    let status: String = row.try_get("status").map_err(backend)?;
    let created_at: String = row.try_get("created_at").map_err(backend)?;
    Ok(Contract {
        id: ContractId::new(row.try_get::<String, _>("id").map_err(backend)?),
        original_artifact: ArtifactRef::new(
            row.try_get::<String, _>("original_artifact").map_err(backend)?,
        ),
        current_artifact: ArtifactRef::new(
            row.try_get::<String, _>("current_artifact").map_err(backend)?,
        ),
        status: ContractStatus::from_str(&status)
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StorageError::Backend(format!("bad created_at: {e}")))?
            .with_timezone(&Utc),
    })
}

fn row_to_field(row: &SqliteRow) -> StorageResult<Field> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let value_text: Option<String> = row.try_get("value_text").map_err(backend)?;
    let value_artifact: Option<String> = row.try_get("value_artifact").map_err(backend)?;
    let value = match (value_text, value_artifact) {
        (Some(text), None) => Some(FieldValue::Text(text)),
        (None, Some(name)) => Some(FieldValue::Image(ArtifactRef::new(name))),
        (None, None) => None,
        (Some(_), Some(_)) => {
            return Err(StorageError::InvariantViolation(
                "field row carries both text and image values".to_string(),
            ))
        }
    };
    Ok(Field {
        id: FieldId(row.try_get("id").map_err(backend)?),
        contract_id: ContractId::new(row.try_get::<String, _>("contract_id").map_err(backend)?),
        kind: FieldKind::from_str(&kind).map_err(|e| StorageError::Backend(e.to_string()))?,
        geometry: FieldGeometry::new(
            row.try_get("x").map_err(backend)?,
            row.try_get("y").map_err(backend)?,
            row.try_get("width").map_err(backend)?,
            row.try_get("height").map_err(backend)?,
        ),
        value,
    })
}

#[async_trait]
impl ContractStore for SqliteContractStore {
    async fn create_contract(&self, contract: Contract) -> StorageResult<()> {
        let id = contract.id.clone();
        sqlx::query(
            r#"
            INSERT INTO contracts (id, original_artifact, current_artifact, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(contract.id.as_str())
        .bind(contract.original_artifact.as_str())
        .bind(contract.current_artifact.as_str())
        .bind(contract.status.as_str())
        .bind(encode_time(contract.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StorageError::Conflict(format!("contract {id} already exists"));
                }
            }
            backend(e)
        })?;
        Ok(())
    }

    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        let row = sqlx::query(
            "SELECT id, original_artifact, current_artifact, status, created_at \
             FROM contracts WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(row_to_contract).transpose()
    }

    async fn list_contracts(&self) -> StorageResult<Vec<Contract>> {
        let rows = sqlx::query(
            "SELECT id, original_artifact, current_artifact, status, created_at \
             FROM contracts ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_contract).collect()
    }

    async fn fields_for(&self, id: &ContractId) -> StorageResult<Vec<Field>> {
        let rows = sqlx::query(
            "SELECT id, contract_id, kind, x, y, width, height, value_text, value_artifact \
             FROM fields WHERE contract_id = ?1 ORDER BY id ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(row_to_field).collect()
    }

    async fn replace_fields(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        layout: Vec<FieldSpec>,
    ) -> StorageResult<Vec<Field>> {
        check_signature_uniqueness(&layout)?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query("UPDATE contracts SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(to.as_str())
            .bind(id.as_str())
            .bind(expected_from.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(self.stale_error(&mut *tx, id, expected_from).await?);
        }

        sqlx::query("DELETE FROM fields WHERE contract_id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let mut inserted = Vec::with_capacity(layout.len());
        for spec in layout {
            let result = sqlx::query(
                "INSERT INTO fields (contract_id, kind, x, y, width, height) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(id.as_str())
            .bind(spec.kind.as_str())
            .bind(spec.geometry.x)
            .bind(spec.geometry.y)
            .bind(spec.geometry.width)
            .bind(spec.geometry.height)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            inserted.push(Field {
                id: FieldId(result.last_insert_rowid()),
                contract_id: id.clone(),
                kind: spec.kind,
                geometry: spec.geometry,
                value: None,
            });
        }

        tx.commit().await.map_err(backend)?;
        Ok(inserted)
    }

    async fn record_render(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        current: ArtifactRef,
        values: Vec<(FieldId, FieldValue)>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query(
            "UPDATE contracts SET status = ?1, current_artifact = ?2 \
             WHERE id = ?3 AND status = ?4",
        )
        .bind(to.as_str())
        .bind(current.as_str())
        .bind(id.as_str())
        .bind(expected_from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(self.stale_error(&mut *tx, id, expected_from).await?);
        }

        for (field_id, value) in &values {
            let (text, artifact) = match value {
                FieldValue::Text(text) => (Some(text.as_str()), None),
                FieldValue::Image(artifact) => (None, Some(artifact.as_str())),
            };
            let updated = sqlx::query(
                "UPDATE fields SET value_text = ?1, value_artifact = ?2 \
                 WHERE id = ?3 AND contract_id = ?4",
            )
            .bind(text)
            .bind(artifact)
            .bind(field_id.0)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            if updated.rows_affected() == 0 {
                return Err(StorageError::InvariantViolation(format!(
                    "field {field_id} does not belong to contract {id}"
                )));
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn transition_status(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
    ) -> StorageResult<()> {
        let updated = sqlx::query("UPDATE contracts SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(to.as_str())
            .bind(id.as_str())
            .bind(expected_from.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(self.stale_error(&self.pool, id, expected_from).await?);
        }
        Ok(())
    }

    async fn reset_values(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query(
            "UPDATE contracts SET status = ?1, current_artifact = original_artifact \
             WHERE id = ?2 AND status = ?3",
        )
        .bind(to.as_str())
        .bind(id.as_str())
        .bind(expected_from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(self.stale_error(&mut *tx, id, expected_from).await?);
        }

        sqlx::query("UPDATE fields SET value_text = NULL, value_artifact = NULL WHERE contract_id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
