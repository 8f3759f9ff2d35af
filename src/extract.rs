// 📂 Extract - the DEL/CSV file produced by the nightly export
//
// Row layout (8 tokens, no header required):
//   CONTRACT_IDENTITY, ACCOUNT_EMAIL, CONTRACT_ID, EMAIL_VERIFIED,
//   <portal type id>, <second-chance type id>, <portal status>, <second-chance status>

use crate::error::{SyncError, SyncResult};
use crate::player::{PlayerAccount, HEADER_TOKEN};
use chrono::NaiveDate;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Day offset the export SQL ships with
pub const DEFAULT_DAYS_BACK: i32 = -1;

const EXPORT_DAY_CLAUSE: &str = "current date -1 day";

pub struct Extract {
    /// One entry per data row, header excluded
    pub rows: Vec<Result<PlayerAccount, SyncError>>,

    /// CSV records read, header included. Blank lines are not records.
    pub total_records: usize,
}

impl Extract {
    pub fn record_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_ok()).count()
    }
}

fn is_header(tokens: &[&str]) -> bool {
    tokens.iter().any(|t| t.contains(HEADER_TOKEN))
}

/// Read an extract file
pub fn read_extract(csv_path: &Path) -> SyncResult<Extract> {
    let file = File::open(csv_path).map_err(|e| {
        SyncError::precondition(format!("Extract file not readable: {} ({})", csv_path.display(), e))
    })?;

    let extract = read_extract_from_reader(file)?;
    log::info!(
        "Read {} rows ({} records) from {}",
        extract.rows.len(),
        extract.total_records,
        csv_path.display()
    );
    Ok(extract)
}

/// Read extract rows from any reader.
///
/// Only I/O failures abort; a row the CSV layer cannot split becomes a
/// malformed entry like any other bad row.
pub fn read_extract_from_reader<R: Read>(reader: R) -> SyncResult<Extract> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut total_records = 0;

    for result in rdr.records() {
        total_records += 1;

        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(SyncError::Csv(e)),
            Err(e) => {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(total_records);
                rows.push(Err(SyncError::malformed(line, e.to_string())));
                continue;
            }
        };

        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(total_records);
        let tokens: Vec<&str> = record.iter().collect();

        if is_header(&tokens) {
            log::debug!("Skipping column-heading row at line {}", line);
            continue;
        }

        rows.push(PlayerAccount::from_tokens(&tokens, line));
    }

    Ok(Extract { rows, total_records })
}

/// Move a leftover extract out of the way before a fresh export.
///
/// Returns the archive path, or `None` when there was nothing to move.
pub fn archive_previous_extract(
    csv_path: &Path,
    archive_dir: &Path,
    date: NaiveDate,
) -> SyncResult<Option<PathBuf>> {
    if !csv_path.exists() {
        return Ok(None);
    }

    let file_name = csv_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SyncError::precondition(format!("Bad extract path: {}", csv_path.display())))?;

    fs::create_dir_all(archive_dir)?;
    let target = archive_dir.join(format!("{}.{}", file_name, date.format("%Y-%m-%d")));

    // rename fails across filesystems; fall back to copy + remove
    if fs::rename(csv_path, &target).is_err() {
        fs::copy(csv_path, &target)?;
        fs::remove_file(csv_path)?;
    }

    log::info!("Archived previous extract to {}", target.display());
    Ok(Some(target))
}

/// Widen or narrow the export window
pub fn prepare_export_sql(template: &str, days_back: i32) -> String {
    if days_back == DEFAULT_DAYS_BACK {
        return template.to_string();
    }
    template.replace(EXPORT_DAY_CLAUSE, &format!("current date {} day", days_back))
}

// ============================================================================
// TESTS
// ============================================================================
