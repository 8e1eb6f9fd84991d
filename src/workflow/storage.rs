/// SQLite persistence for workflows and their executions
///
/// The full workflow definition lives in a JSON `definition` column; `name`,
/// `enabled` and `schedule` are duplicated into columns for listing. Executions
/// reference their workflow and are removed with it.

use crate::runtime::recorder::ExecutionRecorder;
use crate::workflow::types::{Execution, ExecutionStatus, LogEntry, TriggerType, Workflow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Error text stored on executions found running at startup
pub const INTERRUPTED_ERROR: &str = "execution interrupted before completion";

#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and its schema
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening database {}", path))?;

        let storage = Self::new(pool);
        storage.init_schema().await?;
        tracing::info!("💾 Workflow database ready at {}", path);
        Ok(storage)
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and indexes; safe to call repeatedly
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                schedule TEXT,
                definition TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                start_time TEXT,
                end_time TEXT,
                logs TEXT NOT NULL DEFAULT '[]',
                result TEXT,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_executions_workflow_start
            ON workflow_executions(workflow_id, start_time)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the pool; later queries fail
    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }

    /// Connectivity check for the health endpoint
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Insert or update a workflow, stamping its timestamps
    ///
    /// `created_at` is kept when already set; `updated_at` is always now.
    pub async fn save_workflow(&self, workflow: &mut Workflow) -> Result<()> {
        let now = Utc::now();
        let created_at = *workflow.created_at.get_or_insert(now);
        workflow.updated_at = Some(now);
        let definition_json = serde_json::to_string(&*workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, description, enabled, schedule, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                enabled = excluded.enabled,
                schedule = excluded.schedule,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.enabled)
        .bind(&workflow.schedule)
        .bind(&definition_json)
        .bind(timestamp(&created_at))
        .bind(timestamp(&now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(decode_workflow(&row)?)),
            None => Ok(None),
        }
    }

    /// All workflows, newest first
    pub async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT definition FROM workflows ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_workflow).collect()
    }

    pub async fn list_enabled_workflows(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT definition FROM workflows WHERE enabled = 1 ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_workflow).collect()
    }

    /// Every stored workflow keyed by id, for registry initialization
    ///
    /// Rows whose definition no longer decodes are logged and skipped.
    pub async fn load_all_workflows(&self) -> Result<HashMap<String, Workflow>> {
        let rows = sqlx::query("SELECT id, definition FROM workflows")
            .fetch_all(&self.pool)
            .await?;

        let mut workflows = HashMap::new();
        for row in rows {
            let id: String = row.try_get("id")?;
            match decode_workflow(&row) {
                Ok(workflow) => {
                    workflows.insert(id, workflow);
                }
                Err(e) => tracing::warn!("⚠️ Skipping unreadable workflow '{}': {:#}", id, e),
            }
        }

        Ok(workflows)
    }

    /// Delete a workflow and, by cascade, its executions
    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_execution(&self, execution: &Execution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, status, trigger_type, start_time, end_time, logs, result, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(execution.status.as_str())
        .bind(execution.trigger_type.as_str())
        .bind(execution.start_time.as_ref().map(timestamp))
        .bind(execution.end_time.as_ref().map(timestamp))
        .bind(serde_json::to_string(&execution.logs)?)
        .bind(encode_optional(&execution.result)?)
        .bind(&execution.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Write the terminal state; rows that already left `running` are untouched
    pub async fn complete_execution(&self, execution: &Execution) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = ?, end_time = ?, logs = ?, result = ?, error = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(execution.status.as_str())
        .bind(execution.end_time.as_ref().map(timestamp))
        .bind(serde_json::to_string(&execution.logs)?)
        .bind(encode_optional(&execution.result)?)
        .bind(&execution.error)
        .bind(&execution.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_EXECUTION))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_execution).transpose()
    }

    /// Execution history, newest first, optionally for one workflow
    pub async fn list_executions(&self, workflow_id: Option<&str>, limit: i64) -> Result<Vec<Execution>> {
        let rows = match workflow_id {
            Some(workflow_id) => {
                sqlx::query(&format!(
                    "{} WHERE workflow_id = ? ORDER BY start_time DESC LIMIT ?",
                    SELECT_EXECUTION
                ))
                .bind(workflow_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY start_time DESC LIMIT ?", SELECT_EXECUTION))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(decode_execution).collect()
    }

    /// Fail every execution a previous process left unfinished
    pub async fn mark_stale_executions(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = 'failed', end_time = ?, error = ?
            WHERE status IN ('pending', 'running')
            "#,
        )
        .bind(timestamp(&Utc::now()))
        .bind(INTERRUPTED_ERROR)
        .execute(&self.pool)
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            tracing::warn!("🧹 Marked {} interrupted executions as failed", swept);
        }
        Ok(swept)
    }
}

#[async_trait]
impl ExecutionRecorder for WorkflowStorage {
    async fn record_start(&self, execution: &Execution) -> Result<()> {
        self.insert_execution(execution).await
    }

    async fn record_finish(&self, execution: &Execution) -> Result<()> {
        if !self.complete_execution(execution).await? {
            tracing::warn!("⚠️ Execution {} was not running; terminal state not rewritten", execution.id);
        }
        Ok(())
    }
}

const SELECT_EXECUTION: &str = "SELECT id, workflow_id, status, trigger_type, start_time, end_time, logs, result, error FROM workflow_executions";

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|text| {
        DateTime::parse_from_rfc3339(&text)
            .map(|at| at.with_timezone(&Utc))
            .with_context(|| format!("invalid timestamp '{}'", text))
    })
    .transpose()
}

fn encode_optional(value: &Option<serde_json::Value>) -> Result<Option<String>> {
    Ok(match value {
        Some(value) => Some(serde_json::to_string(value)?),
        None => None,
    })
}

fn decode_workflow(row: &SqliteRow) -> Result<Workflow> {
    let definition_json: String = row.try_get("definition")?;
    Ok(serde_json::from_str(&definition_json)?)
}

fn decode_execution(row: &SqliteRow) -> Result<Execution> {
    let status: String = row.try_get("status")?;
    let trigger_type: String = row.try_get("trigger_type")?;
    let logs: String = row.try_get("logs")?;
    let result: Option<String> = row.try_get("result")?;

    Ok(Execution {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        status: ExecutionStatus::from_str(&status).map_err(anyhow::Error::msg)?,
        trigger_type: TriggerType::from_str(&trigger_type).map_err(anyhow::Error::msg)?,
        start_time: parse_timestamp(row.try_get("start_time")?)?,
        end_time: parse_timestamp(row.try_get("end_time")?)?,
        logs: serde_json::from_str::<Vec<LogEntry>>(&logs)?,
        result: result.map(|raw| serde_json::from_str(&raw)).transpose()?,
        error: row.try_get("error")?,
    })
}
