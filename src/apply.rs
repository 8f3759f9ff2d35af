// 🔧 Apply - turn a corrected player into an UPDATE and run it
//
// The template is plain SQL with three placeholders:
//   ContractId, EmailVerifiedStatus, PP_ServiceStatusId
// Corrections always move both services together, so the portal status
// stands in for the second-chance status as well.

use crate::error::{SyncError, SyncResult};
use crate::player::PlayerAccount;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

const CONTRACT_ID_PLACEHOLDER: &str = "ContractId";
const EMAIL_VERIFIED_PLACEHOLDER: &str = "EmailVerifiedStatus";
const SERVICE_STATUS_PLACEHOLDER: &str = "PP_ServiceStatusId";

// ============================================================================
// SQL TEMPLATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqlTemplate {
    text: String,
}

impl SqlTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        SqlTemplate { text: text.into() }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::precondition(format!("SQLT file not readable: {} ({})", path.display(), e))
        })?;
        Ok(SqlTemplate::new(text))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn render(&self, player: &PlayerAccount) -> String {
        self.text
            .replace(CONTRACT_ID_PLACEHOLDER, &player.contract_id().to_string())
            .replace(EMAIL_VERIFIED_PLACEHOLDER, &player.email_verified().code().to_string())
            .replace(SERVICE_STATUS_PLACEHOLDER, &player.portal_service().code().to_string())
    }
}

// ============================================================================
// STATEMENT RUNNERS
// ============================================================================

/// Something that can execute a rendered SQL script
pub trait StatementRunner {
    fn execute(&mut self, sql: &str) -> SyncResult<()>;
}

/// Replays updates against a SQLite database (local copy of the player tables)
pub struct SqliteRunner {
    conn: Connection,
}

impl SqliteRunner {
    pub fn open<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        Ok(SqliteRunner {
            conn: Connection::open(path)?,
        })
    }

    pub fn in_memory() -> SyncResult<Self> {
        Ok(SqliteRunner {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl StatementRunner for SqliteRunner {
    fn execute(&mut self, sql: &str) -> SyncResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Keeps statements instead of running them
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub statements: Vec<String>,
}

impl StatementRunner for RecordingRunner {
    fn execute(&mut self, sql: &str) -> SyncResult<()> {
        self.statements.push(sql.to_string());
        Ok(())
    }
}

// ============================================================================
// APPLIER
// ============================================================================

pub struct Applier<R: StatementRunner> {
    template: SqlTemplate,
    runner: R,
}

impl<R: StatementRunner> Applier<R> {
    pub fn new(template: SqlTemplate, runner: R) -> Self {
        Applier { template, runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Render and execute the update for one corrected player
    pub fn apply(&mut self, player: &PlayerAccount) -> SyncResult<()> {
        let sql = self.template.render(player);
        log::debug!("Applying update for contract {}", player.contract_id());

        self.runner
            .execute(&sql)
            .map_err(|e| SyncError::ApplyFailed {
                contract_id: player.contract_id(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
