// ⚙️ Sync configuration
// Defaults match the production layout; a JSON file and CLI flags override them.

use crate::db2::DEFAULT_DB2_OPTIONS;
use crate::error::{SyncError, SyncResult};
use crate::extract::DEFAULT_DAYS_BACK;
use crate::rules::UnverifiedSuspendedPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SCRIPT_NAME: &str = "sync-pd-services";

/// What a run is allowed to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Export, reconcile, apply
    Full,
    /// Export only
    FindOnly,
    /// Read an existing extract and report; no DB2 access
    DryRun,
    /// Read an existing extract and apply to a SQLite copy
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub work_dir: PathBuf,
    pub export_sql: PathBuf,
    pub csv_file: PathBuf,
    pub update_sqlt: PathBuf,
    pub log_dir: PathBuf,
    pub days_back: i32,
    pub dbname: String,
    pub db2_options: String,
    /// Deliberately unset by default; a run refuses to start without it
    pub unverified_suspended: Option<UnverifiedSuspendedPolicy>,
    pub fail_fast: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            work_dir: Path::new("/files/db2/scripts").join(SCRIPT_NAME),
            export_sql: PathBuf::from("export-sync-pd-services.sql"),
            csv_file: PathBuf::from(format!("{}.csv", SCRIPT_NAME)),
            update_sqlt: PathBuf::from("sync-pd-player-services.sqlt"),
            log_dir: Path::new("/db2dumps/output_logs").join(SCRIPT_NAME),
            days_back: DEFAULT_DAYS_BACK,
            dbname: "PDDB".to_string(),
            db2_options: DEFAULT_DB2_OPTIONS.to_string(),
            unverified_suspended: None,
            fail_fast: false,
        }
    }
}

/// Values given on the command line. `None` keeps whatever the file or the
/// defaults said.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub work_dir: Option<PathBuf>,
    pub export_sql: Option<PathBuf>,
    pub csv_file: Option<PathBuf>,
    pub update_sqlt: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub days_back: Option<i32>,
    pub dbname: Option<String>,
    pub db2_options: Option<String>,
    pub unverified_suspended: Option<UnverifiedSuspendedPolicy>,
    /// A flag can only switch fail-fast on
    pub fail_fast: bool,
}

impl SyncConfig {
    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::precondition(format!("Config file not readable: {} ({})", path.display(), e))
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Layer command-line values over this config
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.work_dir {
            self.work_dir = dir;
        }
        if let Some(file) = overrides.export_sql {
            self.export_sql = file;
        }
        if let Some(file) = overrides.csv_file {
            self.csv_file = file;
        }
        if let Some(file) = overrides.update_sqlt {
            self.update_sqlt = file;
        }
        if let Some(dir) = overrides.log_dir {
            self.log_dir = dir;
        }
        if let Some(days) = overrides.days_back {
            self.days_back = days;
        }
        if let Some(dbname) = overrides.dbname {
            self.dbname = dbname;
        }
        if let Some(options) = overrides.db2_options {
            self.db2_options = options;
        }
        if let Some(policy) = overrides.unverified_suspended {
            self.unverified_suspended = Some(policy);
        }
        if overrides.fail_fast {
            self.fail_fast = true;
        }
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.work_dir.join(file)
        }
    }

    pub fn export_sql_path(&self) -> PathBuf {
        self.resolve(&self.export_sql)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.resolve(&self.csv_file)
    }

    pub fn update_sqlt_path(&self) -> PathBuf {
        self.resolve(&self.update_sqlt)
    }

    pub fn policy(&self) -> SyncResult<UnverifiedSuspendedPolicy> {
        self.unverified_suspended.ok_or_else(|| {
            SyncError::precondition(
                "No policy for (NOT_VERIFIED, SUSPENDED, SUSPENDED) accounts; \
                 set unverified_suspended to promote or leave",
            )
        })
    }

    /// Everything that must hold before a single row is read
    pub fn check_preconditions(&self, mode: RunMode) -> SyncResult<()> {
        if !self.work_dir.is_dir() {
            return Err(SyncError::precondition(format!(
                "Path not found: {}",
                self.work_dir.display()
            )));
        }

        if mode == RunMode::FindOnly || mode == RunMode::Full {
            let export_sql = self.export_sql_path();
            if !export_sql.is_file() {
                return Err(SyncError::precondition(format!(
                    "Export SQL file not found: {}",
                    export_sql.display()
                )));
            }
        }

        if mode == RunMode::Full || mode == RunMode::Sqlite {
            let sqlt = self.update_sqlt_path();
            if !sqlt.is_file() {
                return Err(SyncError::precondition(format!(
                    "SQLT file not found: {}",
                    sqlt.display()
                )));
            }
        }

        if mode == RunMode::DryRun || mode == RunMode::Sqlite {
            let csv = self.csv_path();
            if !csv.is_file() {
                return Err(SyncError::precondition(format!(
                    "Extract file not found: {}",
                    csv.display()
                )));
            }
        }

        if mode != RunMode::FindOnly {
            self.policy()?;
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
