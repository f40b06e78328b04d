//! CLI argument parsing
//!
//! ```text
//! fraudguard [--config FILE] [--log-format pretty|json] [--log-dir DIR] <command>
//!
//! COMMANDS:
//!   serve         HTTP API plus reload, rotation and drift watchdog loops
//!   check-drift   One drift watchdog cycle, report printed as JSON
//!   retrain       One retraining over the configured partition selection
//!   generate-data Seeded synthetic weekly partitions written to the store
//!   simulate      Synthetic partitions published one at a time
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// FraudGuard - fraud scoring with hot-swapped models and drift-triggered retraining
#[derive(Debug, Parser)]
#[command(name = "fraudguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file; FRAUDGUARD_* variables override it
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Console log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write JSON logs to daily rolling files in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the scoring API and run the background loops
    Serve {
        /// Host to bind to (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,

        /// Do not run the drift watchdog in this process
        #[arg(long)]
        no_watchdog: bool,
    },

    /// Run one drift watchdog cycle and print its outcome
    CheckDrift,

    /// Retrain once and publish a new model version
    Retrain,

    /// Write a year of synthetic weekly partitions under the partition prefix
    GenerateData {
        #[command(flatten)]
        synthetic: SyntheticArgs,
    },

    /// Publish synthetic weekly partitions one at a time, like arriving data
    Simulate {
        #[command(flatten)]
        synthetic: SyntheticArgs,

        /// Seconds to wait between partitions
        #[arg(long, default_value_t = 420)]
        interval_secs: u64,
    },
}

/// Shape of the generated partitions
#[derive(Debug, Clone, clap::Args)]
pub struct SyntheticArgs {
    /// Number of weekly partitions
    #[arg(long, default_value_t = 52)]
    pub weeks: u32,

    /// Random seed; the same seed reproduces the same files
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Weeks (1-based, comma separated) that receive strong drift
    #[arg(long, value_delimiter = ',', conflicts_with = "random_drift_weeks")]
    pub drift_weeks: Vec<u32>,

    /// Number of seeded drift weeks, used when --drift-weeks is not given
    #[arg(long, default_value_t = 5)]
    pub random_drift_weeks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "fraudguard",
            "--config",
            "fraudguard.toml",
            "serve",
            "--port",
            "9000",
            "--no-watchdog",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("fraudguard.toml")));
        assert_eq!(cli.log_format, LogFormat::Pretty);
        match cli.command {
            Commands::Serve {
                host,
                port,
                no_watchdog,
            } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9000));
                assert!(no_watchdog);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["fraudguard", "check-drift", "--log-format", "json"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckDrift));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_generate_data_with_explicit_drift_weeks() {
        let cli = Cli::try_parse_from([
            "fraudguard",
            "generate-data",
            "--weeks",
            "10",
            "--drift-weeks",
            "3,7",
        ])
        .unwrap();
        match cli.command {
            Commands::GenerateData { synthetic } => {
                assert_eq!(synthetic.weeks, 10);
                assert_eq!(synthetic.seed, 42);
                assert_eq!(synthetic.drift_weeks, vec![3, 7]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_simulate_defaults() {
        let cli = Cli::try_parse_from(["fraudguard", "simulate", "--seed", "5"]).unwrap();
        match cli.command {
            Commands::Simulate {
                synthetic,
                interval_secs,
            } => {
                assert_eq!(interval_secs, 420);
                assert_eq!(synthetic.seed, 5);
                assert_eq!(synthetic.weeks, 52);
                assert!(synthetic.drift_weeks.is_empty());
                assert_eq!(synthetic.random_drift_weeks, 5);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_drift_week_sources_conflict() {
        assert!(Cli::try_parse_from([
            "fraudguard",
            "generate-data",
            "--drift-weeks",
            "2",
            "--random-drift-weeks",
            "3",
        ])
        .is_err());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["fraudguard"]).is_err());
        assert!(Cli::try_parse_from(["fraudguard", "train-everything"]).is_err());
    }
}
