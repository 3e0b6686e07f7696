//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Whether the failure is an infrastructure hiccup worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Sqlx(sqlx::Error::Io(_))
                | DbError::Sqlx(sqlx::Error::PoolTimedOut)
                | DbError::Sqlx(sqlx::Error::WorkerCrashed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_pool_timeouts_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(DbError::Sqlx(sqlx::Error::Io(io)).is_transient());
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DbError::NotFound.is_transient());
        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_transient());
    }
}
