//! Run record and step journal repository functions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{DbError, NodeResult, RunRecord, RunStatus};

// ---------------------------------------------------------------------------
// workflow_runs
// ---------------------------------------------------------------------------

/// Raw `workflow_runs` row.
#[derive(Debug, FromRow)]
struct RunRow {
    run_id: Uuid,
    workflow_id: Option<String>,
    status: String,
    trigger_data: Value,
    step_results: Value,
    blueprint: Value,
    iteration: i64,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl RunRow {
    fn into_record(self) -> Result<RunRecord, DbError> {
        let status: RunStatus = serde_json::from_value(Value::String(self.status))?;
        let step_results: BTreeMap<String, NodeResult> = serde_json::from_value(self.step_results)?;

        Ok(RunRecord {
            run_id: self.run_id,
            workflow_id: self.workflow_id,
            status,
            trigger_data: self.trigger_data,
            step_results,
            blueprint: self.blueprint,
            iteration: u64::try_from(self.iteration).unwrap_or_default(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
        })
    }
}

const RUN_COLUMNS: &str = "run_id, workflow_id, status, trigger_data, step_results, blueprint, \
                           iteration, created_at, completed_at, error_message";

/// Insert a run; an existing row with the same `run_id` is left untouched.
pub async fn insert_run(pool: &PgPool, run: &RunRecord) -> Result<(), DbError> {
    let step_results = serde_json::to_value(&run.step_results)?;

    sqlx::query(
        r#"
        INSERT INTO workflow_runs
            (run_id, workflow_id, status, trigger_data, step_results, blueprint,
             iteration, created_at, completed_at, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (run_id) DO NOTHING
        "#,
    )
    .bind(run.run_id)
    .bind(&run.workflow_id)
    .bind(run.status.as_str())
    .bind(&run.trigger_data)
    .bind(step_results)
    .bind(&run.blueprint)
    .bind(run.iteration as i64)
    .bind(run.created_at)
    .bind(run.completed_at)
    .bind(&run.error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single run by its primary key.
pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<RunRecord, DbError> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE run_id = $1"
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.into_record()
}

/// List runs (oldest first), optionally restricted to one status.
pub async fn list_runs(pool: &PgPool, status: Option<RunStatus>) -> Result<Vec<RunRecord>, DbError> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, RunRow>(&format!(
                "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE status = $1 ORDER BY created_at ASC"
            ))
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, RunRow>(&format!(
                "SELECT {RUN_COLUMNS} FROM workflow_runs ORDER BY created_at ASC"
            ))
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter().map(RunRow::into_record).collect()
}

/// Overwrite the iteration counter and `step_results` snapshot.
pub async fn save_progress(
    pool: &PgPool,
    run_id: Uuid,
    iteration: u64,
    step_results: &BTreeMap<String, NodeResult>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"UPDATE workflow_runs SET iteration = $1, step_results = $2 WHERE run_id = $3"#,
    )
    .bind(iteration as i64)
    .bind(serde_json::to_value(step_results)?)
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Move a `running` run to `to`. Returns `false` if it was no longer running.
pub async fn transition(
    pool: &PgPool,
    run_id: Uuid,
    to: RunStatus,
    error_message: Option<&str>,
) -> Result<bool, DbError> {
    let completed_at = to.is_terminal().then(Utc::now);

    let result = sqlx::query(
        r#"
        UPDATE workflow_runs
        SET status = $1,
            completed_at = COALESCE($2, completed_at),
            error_message = COALESCE($3, error_message)
        WHERE run_id = $4 AND status = 'running'
        "#,
    )
    .bind(to.as_str())
    .bind(completed_at)
    .bind(error_message)
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(true);
    }

    // Distinguish "not running any more" from "no such run".
    get_run(pool, run_id).await.map(|_| false)
}

// ---------------------------------------------------------------------------
// run_steps (journal)
// ---------------------------------------------------------------------------

/// Recorded output for a journaled step.
pub async fn load_step(pool: &PgPool, run_id: Uuid, step_key: &str) -> Result<Option<Value>, DbError> {
    let output: Option<(Value,)> = sqlx::query_as(
        r#"SELECT output FROM run_steps WHERE run_id = $1 AND step_key = $2"#,
    )
    .bind(run_id)
    .bind(step_key)
    .fetch_optional(pool)
    .await?;

    Ok(output.map(|(v,)| v))
}

/// Upsert a journaled step output.
pub async fn record_step(
    pool: &PgPool,
    run_id: Uuid,
    step_key: &str,
    output: &Value,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO run_steps (run_id, step_key, output, recorded_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (run_id, step_key) DO UPDATE SET output = EXCLUDED.output
        "#,
    )
    .bind(run_id)
    .bind(step_key)
    .bind(output)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete journal entries whose iteration prefix is below `before_iteration`.
pub async fn prune_steps(pool: &PgPool, run_id: Uuid, before_iteration: u64) -> Result<u64, DbError> {
    let done = sqlx::query(
        r#"
        DELETE FROM run_steps
        WHERE run_id = $1 AND split_part(step_key, '/', 1)::BIGINT < $2
        "#,
    )
    .bind(run_id)
    .bind(before_iteration as i64)
    .execute(pool)
    .await?;

    Ok(done.rows_affected())
}
