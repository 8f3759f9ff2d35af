// PD Services Sync - nightly job
// Find out-of-sync player accounts from the last day and fix them

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use pd_sync::config::SCRIPT_NAME;
use pd_sync::db2::clp_log_paths;
use pd_sync::{
    archive_previous_extract, dry_run, prepare_export_sql, read_extract, sync_extract, Applier,
    BatchSummary, ConfigOverrides, Db2Clp, LogSink, RunMode, SqlTemplate, SqliteRunner,
    SyncConfig, SyncRuleTable, UnverifiedSuspendedPolicy,
};

#[derive(Parser, Debug)]
#[command(name = "pd-sync")]
#[command(about = "Find, fix (sync) out-of-sync PD player accounts", long_about = None)]
struct Cli {
    /// Working directory (holds the SQL files and the extract)
    #[arg(long, value_name = "DIR")]
    path: Option<PathBuf>,

    /// JSON config file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Export SQL filename
    #[arg(long, value_name = "FILE")]
    export_sql: Option<PathBuf>,

    /// Extract (DEL csv) filename
    #[arg(long, value_name = "FILE")]
    csvfile: Option<PathBuf>,

    /// Update player services SQLT filename
    #[arg(long, value_name = "FILE")]
    update_sqlt: Option<PathBuf>,

    /// Directory for archived extracts and CLP logs
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Write the application log here instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// No DB2 access: read the extract and report what would change
    #[arg(long, default_value_t = false, conflicts_with_all = ["sqlite", "find"])]
    nodb: bool,

    /// Only export the extract, do not update players
    #[arg(long, default_value_t = false)]
    find: bool,

    /// Find player accounts changed this many days back (default -1)
    #[arg(long, allow_hyphen_values = true)]
    days_back: Option<i32>,

    /// DB name
    #[arg(long)]
    dbname: Option<String>,

    /// DB2OPTIONS for the CLP
    #[arg(long, allow_hyphen_values = true)]
    db2opts: Option<String>,

    /// What to do with (NOT_VERIFIED, SUSPENDED, SUSPENDED) accounts: promote | leave
    #[arg(long, value_name = "POLICY")]
    unverified_suspended: Option<UnverifiedSuspendedPolicy>,

    /// Apply updates to this SQLite database instead of DB2 (reads the existing extract)
    #[arg(long, value_name = "DB", conflicts_with = "find")]
    sqlite: Option<PathBuf>,

    /// Stop at the first failed update
    #[arg(long, default_value_t = false)]
    fail_fast: bool,

    /// Print the active rule table as JSON and exit
    #[arg(long, default_value_t = false)]
    print_rules: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logger(cli.log_file.as_ref()) {
        eprintln!("Cannot initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }
    log::info!("Logger initialized - Starting {} {}", SCRIPT_NAME, pd_sync::VERSION);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logger(log_file: Option<&PathBuf>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            work_dir: self.path.clone(),
            export_sql: self.export_sql.clone(),
            csv_file: self.csvfile.clone(),
            update_sqlt: self.update_sqlt.clone(),
            log_dir: self.log_dir.clone(),
            days_back: self.days_back,
            dbname: self.dbname.clone(),
            db2_options: self.db2opts.clone(),
            unverified_suspended: self.unverified_suspended,
            fail_fast: self.fail_fast,
        }
    }
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    config.apply_overrides(cli.overrides());
    Ok(config)
}

/// Mode flags are mutually exclusive; clap rejects combinations before this runs.
fn run_mode(cli: &Cli) -> RunMode {
    if cli.nodb {
        RunMode::DryRun
    } else if cli.sqlite.is_some() {
        RunMode::Sqlite
    } else if cli.find {
        RunMode::FindOnly
    } else {
        RunMode::Full
    }
}

fn rule_table(config: &SyncConfig) -> Result<SyncRuleTable> {
    let policy = config.policy()?;
    log::warn!(
        "(NOT_VERIFIED, SUSPENDED, SUSPENDED) accounts will be {}",
        match policy {
            UnverifiedSuspendedPolicy::Promote => "promoted to Suspended",
            UnverifiedSuspendedPolicy::Leave => "left as-is",
        }
    );
    Ok(SyncRuleTable::new(policy))
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    if cli.print_rules {
        let table = SyncRuleTable::new(config.policy()?);
        println!("{}", serde_json::to_string_pretty(table.rules())?);
        return Ok(());
    }

    let mode = run_mode(&cli);
    config.check_preconditions(mode)?;
    log::debug!("Mode {:?}, working directory {}", mode, config.work_dir.display());

    let mut sink = LogSink;

    let summary = match mode {
        RunMode::DryRun => {
            let table = rule_table(&config)?;
            let extract = read_extract(&config.csv_path())?;
            dry_run(extract, &table, &mut sink)
        }
        RunMode::Sqlite => {
            let table = rule_table(&config)?;
            let db_path = cli.sqlite.clone().context("--sqlite requires a database path")?;
            let template = SqlTemplate::from_file(config.update_sqlt_path())?;
            let runner = SqliteRunner::open(&db_path)
                .with_context(|| format!("Failed to open SQLite database: {:?}", db_path))?;
            let extract = read_extract(&config.csv_path())?;

            let mut applier = Applier::new(template, runner);
            sync_extract(extract, &table, &mut applier, &mut sink, config.fail_fast)?
        }
        RunMode::FindOnly | RunMode::Full => match run_db2(&config, mode, &mut sink)? {
            Some(summary) => summary,
            None => {
                log::info!("Exiting.");
                return Ok(());
            }
        },
    };

    log::info!("Summary: {}", serde_json::to_string(&summary)?);
    if summary.has_errors() {
        log::warn!(
            "{} malformed rows, {} failed updates",
            summary.errored,
            summary.apply_failed
        );
    }

    Ok(())
}

/// Export through the CLP, then (unless find-only) reconcile and update.
fn run_db2(config: &SyncConfig, mode: RunMode, sink: &mut LogSink) -> Result<Option<BatchSummary>> {
    // the export writes its DEL file relative to the CLP's working directory
    std::env::set_current_dir(&config.work_dir)
        .with_context(|| format!("Failed to enter {:?}", config.work_dir))?;

    let today = Local::now().date_naive();
    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;
    let (clp_log, history_log) = clp_log_paths(&config.log_dir, today);

    let clp = Db2Clp::new(&config.dbname, &config.db2_options, clp_log, history_log);

    log::info!("Checking HADR role of {} ...", config.dbname);
    clp.check_hadr()?;

    archive_previous_extract(&config.csv_path(), &config.log_dir, today)?;

    let export_template = fs::read_to_string(config.export_sql_path())
        .with_context(|| format!("Failed to read export SQL: {:?}", config.export_sql_path()))?;
    let export_sql = prepare_export_sql(&export_template, config.days_back);

    log::info!("Exporting candidate accounts ...");
    clp.connect()?;
    clp.run_script(&export_sql)?;

    if mode == RunMode::FindOnly {
        return Ok(None);
    }

    let table = rule_table(config)?;
    let template = SqlTemplate::from_file(config.update_sqlt_path())?;

    log::debug!("Preparing to process players ...");
    clp.connect()?;

    let extract = read_extract(&config.csv_path())?;
    log::info!("Exported {} players", extract.rows.len());

    let mut applier = Applier::new(template, clp);
    let summary = sync_extract(extract, &table, &mut applier, sink, config.fail_fast)?;
    Ok(Some(summary))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pd-sync").chain(args.iter().copied()))
    }

    fn config_file(dir: &tempfile::TempDir, json: &str) -> String {
        let path = dir.path().join("sync.json");
        fs::write(&path, json).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file(
            &dir,
            r#"{ "dbname": "PDTEST", "days_back": -3, "unverified_suspended": "promote" }"#,
        );

        let cli = parse(&[
            "--config", &path,
            "--dbname", "PDPROD",
            "--days-back", "-7",
            "--unverified-suspended", "leave",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.dbname, "PDPROD");
        assert_eq!(config.days_back, -7);
        assert_eq!(config.unverified_suspended, Some(UnverifiedSuspendedPolicy::Leave));
    }

    #[test]
    fn test_policy_from_config_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file(&dir, r#"{ "unverified_suspended": "promote", "fail_fast": true }"#);

        let cli = parse(&["--config", &path, "--nodb"]).unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.policy().unwrap(), UnverifiedSuspendedPolicy::Promote);
        assert!(config.fail_fast);
        assert_eq!(config.dbname, "PDDB");
    }

    #[test]
    fn test_no_policy_anywhere() {
        let cli = parse(&["--nodb"]).unwrap();
        let config = load_config(&cli).unwrap();

        assert!(config.policy().is_err());
    }

    #[test]
    fn test_mode_flags_conflict() {
        assert!(parse(&["--find", "--sqlite", "pd.db"]).is_err());
        assert!(parse(&["--nodb", "--sqlite", "pd.db"]).is_err());
        assert!(parse(&["--nodb", "--find"]).is_err());
    }

    #[test]
    fn test_run_mode_selection() {
        assert_eq!(run_mode(&parse(&[]).unwrap()), RunMode::Full);
        assert_eq!(run_mode(&parse(&["--find"]).unwrap()), RunMode::FindOnly);
        assert_eq!(run_mode(&parse(&["--nodb"]).unwrap()), RunMode::DryRun);
        assert_eq!(run_mode(&parse(&["--sqlite", "pd.db"]).unwrap()), RunMode::Sqlite);
        // fail-fast is not a mode flag
        assert_eq!(
            run_mode(&parse(&["--sqlite", "pd.db", "--fail-fast"]).unwrap()),
            RunMode::Sqlite
        );
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(parse(&["--unverified-suspended", "maybe"]).is_err());
    }
}
