//! Database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),

    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),
}

impl DbError {
    /// Whether retrying the same call may succeed.
    ///
    /// Only transport failures qualify; query, parse and (de)serialization
    /// errors fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        use surrealdb::error::Api;
        matches!(
            self,
            DbError::Connection(_)
                | DbError::Surreal(surrealdb::Error::Api(
                    Api::Http(_) | Api::Ws(_) | Api::ConnectionUninitialised
                ))
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
