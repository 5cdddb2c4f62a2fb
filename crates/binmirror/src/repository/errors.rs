use sea_orm::DbErr;
use thiserror::Error;

/// Errors that can occur during node repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Node not found.
    #[error("Node not found: {context}")]
    NotFound { context: String },

    /// Invalid input data.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl RepositoryError {
    /// Create a NotFound error for a node address.
    pub fn not_found(category: &str, parent: &str, name: &str) -> Self {
        Self::NotFound {
            context: format!("{category}:{parent}{name}"),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Check if a repository error is retryable (transient).
pub fn is_retryable_error(err: &RepositoryError) -> bool {
    match err {
        RepositoryError::Database(db_err) => is_retryable_db_error(db_err),
        _ => false,
    }
}

pub(crate) fn is_retryable_db_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) => {
            let err_str = err.to_string().to_lowercase();
            // SQLite: database is locked, busy
            // PostgreSQL: connection refused, too many connections
            err_str.contains("locked")
                || err_str.contains("busy")
                || err_str.contains("timeout")
                || err_str.contains("connection")
                || err_str.contains("temporarily unavailable")
        }
        _ => false,
    }
}
