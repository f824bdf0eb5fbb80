//! Recalculates dynamic cohort membership.
//!
//! Usage:
//!   cohort-sync
//!   cohort-sync --db /var/lib/lms/cohorts.db --config cohortrules.json
//!   cohort-sync --cohort 12
//!
//! Without `--cohort`, every active dynamic cohort is recalculated. Intended
//! to run from a nightly scheduler; log verbosity follows `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cohortrules::config::{load_config, CompilerConfig};
use cohortrules::db::CohortDb;
use cohortrules::membership::{current_timestamp, MembershipEvaluator};
use cohortrules::rules::{FieldRegistry, SqlCompiler};
use cohortrules::RuleError;

#[derive(Parser, Debug)]
#[command(name = "cohort-sync")]
#[command(about = "Recalculate dynamic cohort membership from the stored date rules")]
struct Args {
    /// Database path (defaults to ~/.cohortrules/cohortrules.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Compiler config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only recalculate this cohort
    #[arg(long)]
    cohort: Option<i64>,
}

fn run(args: Args) -> Result<(), RuleError> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => CompilerConfig::default(),
    };
    let db = match args.db {
        Some(path) => CohortDb::open_at(path)?,
        None => CohortDb::open()?,
    };
    let evaluator = MembershipEvaluator::new(SqlCompiler::new(config)?, FieldRegistry::default());
    let now = current_timestamp();

    if let Some(cohort_id) = args.cohort {
        let summary = evaluator.sync_cohort_members(&db, cohort_id, now)?;
        log::info!(
            "Cohort {} synced: {} added, {} removed",
            cohort_id,
            summary.added,
            summary.removed
        );
        return Ok(());
    }

    let report = evaluator.sync_all_dynamic_cohorts(&db, now)?;
    log::info!(
        "Synced {} cohorts, {} failed",
        report.synced.len(),
        report.failed.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{} ({})", e, e.recovery_suggestion());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let args =
            Args::try_parse_from(["cohort-sync", "--db", "/tmp/c.db", "--cohort", "12"]).unwrap();
        assert_eq!(args.db, Some(PathBuf::from("/tmp/c.db")));
        assert_eq!(args.cohort, Some(12));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_args_defaults() {
        let args = Args::try_parse_from(["cohort-sync"]).unwrap();
        assert!(args.db.is_none());
        assert!(args.config.is_none());
        assert!(args.cohort.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(Args::try_parse_from(["cohort-sync", "--cohort", "abc"]).is_err());
        assert!(Args::try_parse_from(["cohort-sync", "--db"]).is_err());
        assert!(Args::try_parse_from(["cohort-sync", "--verbose"]).is_err());
    }
}
