//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::OutputFormat;
use crate::models::{OrganizationId, TestMethod};
use crate::privacy::MINIMUM_RECORDS_ENV;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// fedttest - privacy-preserving two-sample t-test across two data stations
///
/// Each organization releases only per-column mean, count and sample
/// variance; the aggregator combines the two summaries into a t-test.
///
/// Examples:
///   fedttest aggregate --orgs 1,2 --columns age,bmi
///   fedttest aggregate --orgs 1,2 --format json --output result.json
///   fedttest partial --dataset station_a.csv --columns age
///   fedttest init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Enable verbose logging output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Compare two organizations column by column
    Aggregate(AggregateArgs),

    /// Compute this organization's partial summaries and print them as JSON
    Partial(PartialArgs),

    /// Generate a default .fedttest.toml configuration file
    InitConfig,
}

/// Arguments of `fedttest aggregate`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct AggregateArgs {
    /// The two organizations to compare (comma-separated, A then B)
    #[arg(long, value_name = "IDS", value_delimiter = ',', required = true)]
    pub orgs: Vec<OrganizationId>,

    /// Columns to compare (comma-separated); all numeric columns if omitted
    #[arg(long, value_name = "COLUMNS", value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fedttest.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Test method (welch, student)
    #[arg(long, value_name = "METHOD")]
    pub method: Option<TestMethod>,

    /// Significance level used in the report
    #[arg(long, value_name = "ALPHA")]
    pub alpha: Option<f64>,

    /// Per-organization timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Exit with code 2 if any column differs at the significance level
    #[arg(long)]
    pub fail_on_significant: bool,

    /// Validate the request and configuration without computing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments of `fedttest partial`.
#[derive(ClapArgs, Debug, Clone)]
pub struct PartialArgs {
    /// CSV dataset of this organization
    #[arg(long, value_name = "FILE")]
    pub dataset: PathBuf,

    /// Columns to summarise (comma-separated); all numeric columns if omitted
    #[arg(long, value_name = "COLUMNS", value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Minimum number of records required to release any summary
    #[arg(long, value_name = "COUNT", env = MINIMUM_RECORDS_ENV, default_value_t = crate::privacy::DEFAULT_MINIMUM_NUMBER_OF_RECORDS)]
    pub minimum_records: u64,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Aggregate(args) => args.validate(),
            Command::Partial(args) => {
                if !args.dataset.is_file() {
                    return Err(format!(
                        "Dataset does not exist: {}",
                        args.dataset.display()
                    ));
                }
                Ok(())
            }
            Command::InitConfig => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

impl AggregateArgs {
    /// Validate the aggregate arguments.
    ///
    /// The organization count is deliberately not checked here; the
    /// aggregator rejects it with a typed error.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(alpha) = self.alpha {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err("Alpha must be between 0 and 1 (exclusive)".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.columns.iter().any(|c| c.trim().is_empty()) {
            return Err("Column names must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> AggregateArgs {
        AggregateArgs {
            orgs: vec![1, 2],
            columns: vec!["age".to_string()],
            ..AggregateArgs::default()
        }
    }

    #[test]
    fn test_parse_aggregate() {
        let args = Args::try_parse_from([
            "fedttest",
            "aggregate",
            "--orgs",
            "3,4",
            "--columns",
            "age,bmi",
            "--method",
            "student",
            "--format",
            "json",
        ])
        .unwrap();

        match args.command {
            Command::Aggregate(agg) => {
                assert_eq!(agg.orgs, vec![3, 4]);
                assert_eq!(agg.columns, vec!["age", "bmi"]);
                assert_eq!(agg.method, Some(TestMethod::Student));
                assert_eq!(agg.format, Some(OutputFormat::Json));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_partial_default_minimum() {
        let args = Args::try_parse_from([
            "fedttest",
            "partial",
            "--dataset",
            "a.csv",
            "--minimum-records",
            "5",
        ])
        .unwrap();

        match args.command {
            Command::Partial(partial) => {
                assert_eq!(partial.minimum_records, 5);
                assert!(partial.columns.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validation_invalid_alpha() {
        let mut args = make_args();
        args.alpha = Some(1.5);
        assert!(args.validate().is_err());

        args.alpha = Some(0.01);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let result = Args::try_parse_from(["fedttest", "-v", "-q", "init-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = Args {
            verbose: false,
            quiet: false,
            command: Command::InitConfig,
        };
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
