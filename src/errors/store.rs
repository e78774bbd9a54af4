//! Trade persistence errors.

/// Errors that can occur against the persistence sink
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to connect to trade store {url}: {source}")]
    ConnectFailed { url: String, source: sqlx::Error },

    #[error("Insert into {table} failed: {source}")]
    InsertFailed { table: String, source: sqlx::Error },

    #[error("Fetch from {table} failed: {source}")]
    FetchFailed { table: String, source: sqlx::Error },

    #[error("Schema migration failed: {source}")]
    MigrationFailed { source: sqlx::Error },
}
