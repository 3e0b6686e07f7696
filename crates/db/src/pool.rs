//! Postgres pool for `bizflow serve` and `bizflow migrate`.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// How long a store call waits for a free connection before failing with a
/// transient `PoolTimedOut`.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to `DATABASE_URL` with at most `BIZFLOW_MAX_CONNECTIONS` connections.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    info!(
        url = %redacted(database_url),
        max_connections,
        "connecting to run store"
    );
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the embedded migrations (`workflow_blueprints`, `workflow_runs`,
/// `run_steps`).
pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    info!("applying run store migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// `url` with any password replaced by `***`, for logging.
fn redacted(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_owned();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_owned();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_hidden_in_logged_url() {
        assert_eq!(
            redacted("postgres://bizflow:s3cret@db:5432/bizflow"),
            "postgres://bizflow:***@db:5432/bizflow"
        );
        assert_eq!(redacted("postgres://db/bizflow"), "postgres://db/bizflow");
        assert_eq!(redacted("postgres://bizflow@db/bizflow"), "postgres://bizflow@db/bizflow");
    }
}
