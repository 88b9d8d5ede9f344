//! Error types for the organizer store.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=lifecycle, 4=validation, etc.)
//! - Retryability flags for callers deciding whether to resubmit
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,
    MigrationError,

    // Lifecycle (exit 3)
    NotInitialized,
    EngineNotLoaded,

    // Validation (exit 4)
    InvalidTable,
    InvalidIdentifier,
    InvalidQuery,
    InvalidArgument,

    // Transaction (exit 5)
    TransactionFailed,
    TransactionInactive,
    BatchCommitted,

    // Snapshot (exit 6)
    SnapshotError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::MigrationError => "MIGRATION_ERROR",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::EngineNotLoaded => "ENGINE_NOT_LOADED",
            Self::InvalidTable => "INVALID_TABLE",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::TransactionFailed => "TRANSACTION_FAILED",
            Self::TransactionInactive => "TRANSACTION_INACTIVE",
            Self::BatchCommitted => "BATCH_COMMITTED",
            Self::SnapshotError => "SNAPSHOT_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::MigrationError => 2,
            Self::NotInitialized | Self::EngineNotLoaded => 3,
            Self::InvalidTable
            | Self::InvalidIdentifier
            | Self::InvalidQuery
            | Self::InvalidArgument => 4,
            Self::TransactionFailed | Self::TransactionInactive | Self::BatchCommitted => 5,
            Self::SnapshotError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a caller could succeed by resubmitting corrected input.
    ///
    /// Nothing in this crate retries on its own; this only informs callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidTable
                | Self::InvalidIdentifier
                | Self::InvalidQuery
                | Self::InvalidArgument
                | Self::TransactionFailed
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in store operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database not initialized: call init_database first")]
    NotInitialized,

    #[error("SQL engine not loaded: initialize the database before resetting it")]
    EngineNotLoaded,

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Invalid column name: {0}")]
    InvalidIdentifier(String),

    /// Builder misuse or malformed clause (value counts, LIMIT, direction, ...).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Transaction failed in savepoint {savepoint}: {source}")]
    Transaction {
        savepoint: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Transaction context used after {state}")]
    TransactionInactive { state: &'static str },

    #[error("Batch inserter already committed")]
    BatchCommitted,

    #[error("Migration to version {version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an error raised inside a savepoint, leaving already-wrapped errors as is.
    #[must_use]
    pub fn in_savepoint(self, savepoint: &str) -> Self {
        match self {
            Self::Transaction { .. } => self,
            other => Self::Transaction {
                savepoint: savepoint.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error beneath any transaction wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Transaction { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::EngineNotLoaded => ErrorCode::EngineNotLoaded,
            Self::InvalidTable(_) => ErrorCode::InvalidTable,
            Self::InvalidIdentifier(_) => ErrorCode::InvalidIdentifier,
            Self::InvalidQuery(_) => ErrorCode::InvalidQuery,
            Self::Transaction { .. } => ErrorCode::TransactionFailed,
            Self::TransactionInactive { .. } => ErrorCode::TransactionInactive,
            Self::BatchCommitted => ErrorCode::BatchCommitted,
            Self::Migration { .. } => ErrorCode::MigrationError,
            Self::Snapshot(_) => ErrorCode::SnapshotError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `ostore init` to create or restore the database".to_string())
            }
            Self::EngineNotLoaded => Some(
                "Reset needs a loaded engine. Run `ostore init` once before `ostore reset`."
                    .to_string(),
            ),
            Self::InvalidTable(_) => Some(
                "Allowed tables: settings, areas, categories, folders, items, tags, \
                 item_tags, activity_log, schema_version"
                    .to_string(),
            ),
            Self::InvalidIdentifier(_) => Some(
                "Columns must be plain identifiers, `*`, `FUNC(col)` aggregates, or `col AS alias`"
                    .to_string(),
            ),
            Self::Snapshot(msg) if msg.contains("checksum") => Some(
                "The stored snapshot is damaged. `ostore reset --force` rebuilds an empty database."
                    .to_string(),
            ),
            Self::Migration { .. } => Some(
                "Migrations are idempotent; fix the cause and re-run `ostore migrate`".to_string(),
            ),
            Self::Transaction { source, .. } => source.hint(),
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
