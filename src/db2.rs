// 🗄️ DB2 command line processor
// Thin wrapper around the `db2` binary: connect, pipe a script, read a snapshot.

use crate::apply::StatementRunner;
use crate::error::{SyncError, SyncResult};
use chrono::NaiveDate;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

pub const DEFAULT_DB2_OPTIONS: &str = "-cmstx +p";

const DB2_BIN: &str = "db2";
/// CLP exit codes below this are success, no rows (1) or warnings (2)
const CLP_FAILURE_CODE: i32 = 4;
const CLP_LOG_PREFIX: &str = "sync-pd-services-db2-clp.log";
const HISTORY_LOG: &str = "sync-pd-services-history.log";

/// CLP output log (one per day) and the shared history log
pub fn clp_log_paths(log_dir: &Path, date: NaiveDate) -> (PathBuf, PathBuf) {
    (
        log_dir.join(format!("{}.{}", CLP_LOG_PREFIX, date.format("%Y-%m-%d"))),
        log_dir.join(HISTORY_LOG),
    )
}

/// Value for the `DB2OPTIONS` environment variable
pub fn db2_options_env(options: &str, clp_log: &Path, history_log: &Path) -> String {
    if options.trim().is_empty() {
        format!(
            "{} -z {} -l {}",
            DEFAULT_DB2_OPTIONS,
            clp_log.display(),
            history_log.display()
        )
    } else {
        options.to_string()
    }
}

/// Collapse multi-line CLP output into one log-friendly line
pub fn flatten_output(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn mentions_error(text: &str) -> bool {
    text.contains("error")
}

/// A CLP run failed if it exited with 4 (SQL error) or 8 (system error), or died on a signal
fn clp_failed(status: &ExitStatus) -> bool {
    match status.code() {
        Some(code) => code >= CLP_FAILURE_CODE,
        None => true,
    }
}

fn exit_description(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Refuse to run against a HADR standby or an unreachable database.
pub fn inspect_hadr_snapshot(snapshot: &str) -> SyncResult<()> {
    let mut hadr_enabled = false;
    let mut role_standby = false;

    for line in snapshot.lines() {
        if line.contains("SQL1013N") {
            return Err(SyncError::precondition(flatten_output(line)));
        }
        if line.contains("HADR") {
            hadr_enabled = true;
        }
        if let Some(pos) = line.find("Role ") {
            if line[pos..].contains("= Standby") {
                role_standby = true;
            }
        }
    }

    if hadr_enabled && role_standby {
        return Err(SyncError::precondition("HADR Role: Standby"));
    }
    Ok(())
}

// ============================================================================
// CLP SESSION
// ============================================================================

#[derive(Debug, Clone)]
pub struct Db2Clp {
    pub program: PathBuf,
    pub dbname: String,
    pub options: String,
    pub clp_log: PathBuf,
    pub history_log: PathBuf,
}

impl Db2Clp {
    pub fn new(dbname: &str, options: &str, clp_log: PathBuf, history_log: PathBuf) -> Self {
        Db2Clp {
            program: PathBuf::from(DB2_BIN),
            dbname: dbname.to_string(),
            options: options.to_string(),
            clp_log,
            history_log,
        }
    }

    /// Run another CLP binary instead of `db2` from `PATH`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env(
            "DB2OPTIONS",
            db2_options_env(&self.options, &self.clp_log, &self.history_log),
        );
        cmd
    }

    fn spawn_failed(&self, e: std::io::Error) -> SyncError {
        SyncError::precondition(format!("Cannot start {}: {}", self.program.display(), e))
    }

    pub fn connect(&self) -> SyncResult<()> {
        let output = self
            .command()
            .arg(format!("connect to {}", self.dbname))
            .output()
            .map_err(|e| self.spawn_failed(e))?;

        if !output.status.success() {
            return Err(SyncError::precondition(flatten_output(&String::from_utf8_lossy(
                &output.stdout,
            ))));
        }

        log::debug!("Connected to {}", self.dbname);
        Ok(())
    }

    /// `db2 get snapshot for database on <dbname>`, checked for standby role.
    ///
    /// A snapshot that cannot be taken at all (instance down, bad alias) is
    /// as fatal as a standby role.
    pub fn check_hadr(&self) -> SyncResult<()> {
        let output = self
            .command()
            .arg(format!("get snapshot for database on {}", self.dbname))
            .output()
            .map_err(|e| self.spawn_failed(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        inspect_hadr_snapshot(&stdout)?;

        if !output.status.success() {
            let mut message = flatten_output(&String::from_utf8_lossy(&output.stderr));
            if message.is_empty() {
                message = flatten_output(&stdout);
            }
            if message.is_empty() {
                message = exit_description(&output.status);
            }
            return Err(SyncError::precondition(format!(
                "Snapshot of {} failed: {}",
                self.dbname, message
            )));
        }
        Ok(())
    }

    /// Pipe a script into a fresh CLP process.
    ///
    /// Fails on a CLP exit status of 4 or more, or on any `error` in its output.
    pub fn run_script(&self, sql: &str) -> SyncResult<String> {
        let mut child = self
            .command()
            .arg("-z")
            .arg(&self.clp_log)
            .arg("-l")
            .arg(&self.history_log)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_failed(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(sql.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        check_script_output(&output)
    }
}

fn check_script_output(output: &Output) -> SyncResult<String> {
    let stdout = flatten_output(&String::from_utf8_lossy(&output.stdout));
    let stderr = flatten_output(&String::from_utf8_lossy(&output.stderr));

    if clp_failed(&output.status) {
        let message = [stdout.as_str(), stderr.as_str()]
            .into_iter()
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if message.is_empty() {
            return Err(SyncError::Clp(exit_description(&output.status)));
        }
        return Err(SyncError::Clp(message));
    }

    if mentions_error(&stdout) {
        return Err(SyncError::Clp(stdout));
    }
    if mentions_error(&stderr) {
        return Err(SyncError::Clp(stderr));
    }
    Ok(stdout)
}

impl StatementRunner for Db2Clp {
    fn execute(&mut self, sql: &str) -> SyncResult<()> {
        self.run_script(sql).map(|_| ())
    }
}

// ============================================================================
// TESTS
// ============================================================================
