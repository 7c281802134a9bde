//! PostgreSQL Transfer Store
//!
//! Records live in `runner_tb`, keyed by (owner, requester, requested, id).
//! Ids come from the shared `runner_seq` sequence; an insert that collides
//! goes through [`insert_with_single_retry`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::identity::IdentityAllocator;
use super::retry::{InsertAttempt, RunnerInsert, insert_with_single_retry};
use super::TransferStore;
use crate::runner::{
    LifecycleStatus, StepStatus, TaskStep, TransferError, TransferKey, TransferMode,
    TransferRecord,
};

const SCHEMA: [&str; 3] = [
    "CREATE SEQUENCE IF NOT EXISTS runner_seq START 1",
    r#"
    CREATE TABLE IF NOT EXISTS runner_tb (
        owner_id              VARCHAR(128) NOT NULL,
        requester_id          VARCHAR(128) NOT NULL,
        requested_id          VARCHAR(128) NOT NULL,
        transfer_id           BIGINT       NOT NULL,
        rule_id               VARCHAR(128) NOT NULL,
        phase                 SMALLINT     NOT NULL,
        last_successful_phase SMALLINT     NOT NULL,
        task_index            INTEGER      NOT NULL,
        block_rank            BIGINT       NOT NULL,
        step_status           CHAR(1)      NOT NULL,
        info_status           CHAR(1)      NOT NULL,
        lifecycle_status      SMALLINT     NOT NULL,
        is_sender             BOOLEAN      NOT NULL,
        file_name             TEXT         NOT NULL,
        original_file_name    TEXT         NOT NULL,
        file_metadata         TEXT         NOT NULL,
        block_size            INTEGER      NOT NULL,
        transfer_mode         SMALLINT     NOT NULL,
        started_at            TIMESTAMPTZ  NOT NULL,
        last_updated_at       TIMESTAMPTZ  NOT NULL,
        file_was_relocated    BOOLEAN      NOT NULL,
        PRIMARY KEY (owner_id, requester_id, requested_id, transfer_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS runner_lifecycle_idx ON runner_tb (lifecycle_status, last_updated_at)",
];

const SELECT_COLUMNS: &str = r#"
    SELECT owner_id, requester_id, requested_id, transfer_id, rule_id, phase,
           last_successful_phase, task_index, block_rank, step_status, info_status,
           lifecycle_status, is_sender, file_name, original_file_name, file_metadata,
           block_size, transfer_mode, started_at, last_updated_at, file_was_relocated
    FROM runner_tb
"#;

/// Ids from the `runner_seq` sequence
#[derive(Clone)]
pub struct SequenceIdAllocator {
    pool: PgPool,
}

impl SequenceIdAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Make `nextval` return at least `next`. Never moves the sequence back.
    pub async fn advance_to(&self, next: i64) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            SELECT setval('runner_seq', $1, false)
            WHERE $1 > (SELECT last_value FROM runner_seq)
            "#,
        )
        .bind(next)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityAllocator for SequenceIdAllocator {
    async fn next_id(&self) -> Result<i64, TransferError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT nextval('runner_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }
}

pub struct PgTransferStore {
    pool: PgPool,
    sequence: SequenceIdAllocator,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            sequence: SequenceIdAllocator::new(pool.clone()),
            pool,
        }
    }

    pub fn allocator(&self) -> &SequenceIdAllocator {
        &self.sequence
    }

    /// Create the sequence, table and index if missing
    pub async fn ensure_schema(&self) -> Result<(), TransferError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<TransferRecord, TransferError> {
        let phase_id: i16 = row.try_get("phase")?;
        let phase = TaskStep::from_id(phase_id)
            .ok_or_else(|| TransferError::SystemError(format!("Invalid phase ID: {}", phase_id)))?;
        let last_id: i16 = row.try_get("last_successful_phase")?;
        let last_successful_phase = TaskStep::from_id(last_id)
            .ok_or_else(|| TransferError::SystemError(format!("Invalid phase ID: {}", last_id)))?;
        let lifecycle_id: i16 = row.try_get("lifecycle_status")?;
        let lifecycle = LifecycleStatus::from_id(lifecycle_id).ok_or_else(|| {
            TransferError::SystemError(format!("Invalid lifecycle status: {}", lifecycle_id))
        })?;
        let mode_id: i16 = row.try_get("transfer_mode")?;
        let mode = TransferMode::from_id(mode_id).ok_or_else(|| {
            TransferError::SystemError(format!("Invalid transfer mode: {}", mode_id))
        })?;
        let step_status: String = row.try_get("step_status")?;
        let info_status: String = row.try_get("info_status")?;
        let task_index: i32 = row.try_get("task_index")?;
        let block_rank: i64 = row.try_get("block_rank")?;
        let block_size: i32 = row.try_get("block_size")?;

        Ok(TransferRecord::from_parts(
            TransferKey::new(
                row.try_get::<String, _>("owner_id")?,
                row.try_get::<String, _>("requester_id")?,
                row.try_get::<String, _>("requested_id")?,
                row.try_get::<i64, _>("transfer_id")?,
            ),
            row.try_get("rule_id")?,
            phase,
            last_successful_phase,
            task_index.max(0) as u32,
            block_rank.max(0) as u64,
            StepStatus::from_code_str(&step_status),
            StepStatus::from_code_str(&info_status),
            lifecycle,
            row.try_get("is_sender")?,
            row.try_get("file_name")?,
            row.try_get("original_file_name")?,
            row.try_get("file_metadata")?,
            block_size.max(0) as u32,
            mode,
            row.try_get::<DateTime<Utc>, _>("started_at")?,
            row.try_get::<DateTime<Utc>, _>("last_updated_at")?,
            row.try_get("file_was_relocated")?,
        ))
    }
}

#[async_trait]
impl RunnerInsert for PgTransferStore {
    async fn next_id(&self) -> Result<i64, TransferError> {
        self.sequence.next_id().await
    }

    async fn try_insert(&self, record: &TransferRecord) -> Result<InsertAttempt, TransferError> {
        let key = record.key();
        let result = sqlx::query(
            r#"
            INSERT INTO runner_tb
                (owner_id, requester_id, requested_id, transfer_id, rule_id, phase,
                 last_successful_phase, task_index, block_rank, step_status, info_status,
                 lifecycle_status, is_sender, file_name, original_file_name, file_metadata,
                 block_size, transfer_mode, started_at, last_updated_at, file_was_relocated)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                 $17, $18, $19, $20, $21)
            "#,
        )
        .bind(&key.owner)
        .bind(&key.requester)
        .bind(&key.requested)
        .bind(key.transfer_id)
        .bind(record.rule_id())
        .bind(record.phase().id())
        .bind(record.last_successful_phase().id())
        .bind(record.task_index() as i32)
        .bind(record.block_rank() as i64)
        .bind(String::from(record.step_status()))
        .bind(String::from(record.info_status()))
        .bind(record.lifecycle_status().id())
        .bind(record.is_sender())
        .bind(record.file_name())
        .bind(record.original_file_name())
        .bind(record.file_metadata())
        .bind(record.block_size() as i32)
        .bind(record.mode().id())
        .bind(record.started_at())
        .bind(record.last_updated_at())
        .bind(record.file_was_relocated())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertAttempt::Inserted),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertAttempt::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn max_id_for(&self, record: &TransferRecord) -> Result<Option<i64>, TransferError> {
        let key = record.key();
        let max = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT MAX(transfer_id) FROM runner_tb
            WHERE owner_id = $1 AND requester_id = $2 AND requested_id = $3
            "#,
        )
        .bind(&key.owner)
        .bind(&key.requester)
        .bind(&key.requested)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    async fn advance_sequence(&self, next: i64) -> Result<(), TransferError> {
        self.sequence.advance_to(next).await
    }
}

#[async_trait]
impl TransferStore for PgTransferStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create(&self, record: &mut TransferRecord) -> Result<(), TransferError> {
        insert_with_single_retry(self, record).await
    }

    async fn update(&self, record: &mut TransferRecord) -> Result<(), TransferError> {
        let key = record.key();
        let result = sqlx::query(
            r#"
            UPDATE runner_tb
            SET rule_id = $5, phase = $6, last_successful_phase = $7, task_index = $8,
                block_rank = $9, step_status = $10, info_status = $11,
                lifecycle_status = $12, is_sender = $13, file_name = $14,
                original_file_name = $15, file_metadata = $16, block_size = $17,
                transfer_mode = $18, last_updated_at = $19, file_was_relocated = $20
            WHERE owner_id = $1 AND requester_id = $2 AND requested_id = $3
              AND transfer_id = $4
            "#,
        )
        .bind(&key.owner)
        .bind(&key.requester)
        .bind(&key.requested)
        .bind(key.transfer_id)
        .bind(record.rule_id())
        .bind(record.phase().id())
        .bind(record.last_successful_phase().id())
        .bind(record.task_index() as i32)
        .bind(record.block_rank() as i64)
        .bind(String::from(record.step_status()))
        .bind(String::from(record.info_status()))
        .bind(record.lifecycle_status().id())
        .bind(record.is_sender())
        .bind(record.file_name())
        .bind(record.original_file_name())
        .bind(record.file_metadata())
        .bind(record.block_size() as i32)
        .bind(record.mode().id())
        .bind(record.last_updated_at())
        .bind(record.file_was_relocated())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransferError::TransferNotFound(key.to_string()));
        }
        record.mark_saved();
        Ok(())
    }

    async fn select(&self, key: &TransferKey) -> Result<Option<TransferRecord>, TransferError> {
        let sql = format!(
            "{} WHERE owner_id = $1 AND requester_id = $2 AND requested_id = $3 AND transfer_id = $4",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&key.owner)
            .bind(&key.requester)
            .bind(&key.requested)
            .bind(key.transfer_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &TransferKey) -> Result<bool, TransferError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM runner_tb
                WHERE owner_id = $1 AND requester_id = $2 AND requested_id = $3
                  AND transfer_id = $4
            )
            "#,
        )
        .bind(&key.owner)
        .bind(&key.requester)
        .bind(&key.requested)
        .bind(key.transfer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn delete(&self, key: &TransferKey) -> Result<bool, TransferError> {
        let result = sqlx::query(
            r#"
            DELETE FROM runner_tb
            WHERE owner_id = $1 AND requester_id = $2 AND requested_id = $3
              AND transfer_id = $4
            "#,
        )
        .bind(&key.owner)
        .bind(&key.requester)
        .bind(&key.requested)
        .bind(key.transfer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn all_matching_lifecycle(
        &self,
        status: LifecycleStatus,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let sql = format!(
            "{} WHERE lifecycle_status = $1 ORDER BY last_updated_at ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.id())
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(Self::row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn reset_to_submit(&self, owner: &str) -> Result<u64, TransferError> {
        let result = sqlx::query(
            r#"
            UPDATE runner_tb SET lifecycle_status = $1
            WHERE owner_id = $2 AND lifecycle_status IN ($3, $4)
            "#,
        )
        .bind(LifecycleStatus::ToSubmit.id())
        .bind(owner)
        .bind(LifecycleStatus::Running.id())
        .bind(LifecycleStatus::Interrupted.id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn change_finished_to_done(&self, owner: &str) -> Result<u64, TransferError> {
        let result = sqlx::query(
            r#"
            UPDATE runner_tb SET lifecycle_status = $1
            WHERE owner_id = $2 AND phase = $3 AND step_status = $4
              AND lifecycle_status <> $1
            "#,
        )
        .bind(LifecycleStatus::Done.id())
        .bind(owner)
        .bind(TaskStep::AllDone.id())
        .bind(String::from(StepStatus::CompleteOk))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge(&self, before: DateTime<Utc>) -> Result<u64, TransferError> {
        let result = sqlx::query(
            r#"
            DELETE FROM runner_tb
            WHERE last_updated_at < $1
              AND lifecycle_status <> $2
              AND (phase = $3 OR (phase = $4 AND step_status <> $5))
            "#,
        )
        .bind(before)
        .bind(LifecycleStatus::ToSubmit.id())
        .bind(TaskStep::AllDone.id())
        .bind(TaskStep::ErrorTask.id())
        .bind(String::from(StepStatus::Running))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
