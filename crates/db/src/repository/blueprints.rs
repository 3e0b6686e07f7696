//! Blueprint CRUD operations.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::{BlueprintRow, DbError};

#[derive(Debug, FromRow)]
struct Row {
    id: String,
    name: String,
    definition: Value,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<Row> for BlueprintRow {
    fn from(r: Row) -> Self {
        BlueprintRow {
            id: r.id,
            name: r.name,
            definition: r.definition,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

/// Insert a blueprint, or replace the one with the same `id`.
pub async fn save_blueprint(pool: &PgPool, row: &BlueprintRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_blueprints (id, name, definition, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                definition = EXCLUDED.definition,
                is_active = EXCLUDED.is_active
        "#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(&row.definition)
    .bind(row.is_active)
    .bind(row.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single blueprint by its primary key.
pub async fn get_blueprint(pool: &PgPool, id: &str) -> Result<BlueprintRow, DbError> {
    let row = sqlx::query_as::<_, Row>(
        r#"SELECT id, name, definition, is_active, created_at FROM workflow_blueprints WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row.into())
}

/// Return blueprints ordered by creation time (newest first).
pub async fn list_blueprints(pool: &PgPool, active_only: bool) -> Result<Vec<BlueprintRow>, DbError> {
    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT id, name, definition, is_active, created_at
        FROM workflow_blueprints
        WHERE is_active OR NOT $1
        ORDER BY created_at DESC, id ASC
        "#,
    )
    .bind(active_only)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Toggle whether a blueprint takes part in trigger dispatch.
pub async fn set_active(pool: &PgPool, id: &str, active: bool) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE workflow_blueprints SET is_active = $1 WHERE id = $2")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Permanently delete a blueprint by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_blueprint(pool: &PgPool, id: &str) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflow_blueprints WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
