use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Row could not be turned into a player account. Skipped, never fatal.
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Apply failed for contract {contract_id}: {reason}")]
    ApplyFailed { contract_id: u64, reason: String },

    /// The DB2 command line processor reported an error.
    #[error("DB2 CLP error: {0}")]
    Clp(String),

    /// Run cannot start at all.
    #[error("Precondition failed: {0}")]
    FatalPrecondition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl SyncError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        SyncError::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        SyncError::FatalPrecondition(msg.into())
    }

    /// Row-level errors are skipped; everything else stops the run.
    pub fn is_row_level(&self) -> bool {
        matches!(self, SyncError::MalformedRecord { .. })
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
