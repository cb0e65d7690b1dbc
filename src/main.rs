//! fedttest - privacy-preserving two-sample t-test
//!
//! Compares a numeric column between two organizations that never share
//! row-level data. Each organization releases only mean, count and sample
//! variance per column; the aggregator turns the pair into a t-test.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, guard failure, transport, etc.)
//!   2 - A column differs significantly and --fail-on-significant was set

mod analysis;
mod cli;
mod config;
mod dataset;
mod error;
mod models;
mod node;
mod partial;
mod privacy;
mod report;

use analysis::Aggregator;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{AggregateArgs, Args, Command, PartialArgs};
use config::{Config, NodeLocation, OutputFormat};
use dataset::LocalDataset;
use error::PartialError;
use models::{AggregationRequest, PartialResponse};
use node::{HttpNode, LocalNode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig = args.command {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("fedttest v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let outcome = match args.command {
        Command::Aggregate(ref aggregate_args) => run_aggregate(aggregate_args).await,
        Command::Partial(ref partial_args) => run_partial(partial_args),
        Command::InitConfig => Ok(0),
    };

    match outcome {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .fedttest.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", config::DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::DEFAULT_CONFIG_FILE);
    println!("   Edit it to point each organization at its dataset or endpoint.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete aggregation workflow. Returns exit code (0 or 2).
async fn run_aggregate(args: &AggregateArgs) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(args)?;
    config.merge_with_args(args);
    config.validate()?;

    let request = AggregationRequest::new(args.orgs.clone(), args.columns.clone());

    if args.dry_run {
        return handle_dry_run(&config, &request);
    }

    let aggregator = build_aggregator(&config, &request)?;

    println!(
        "🔬 Comparing organizations {:?} ({})",
        request.organizations_to_include, config.general.method
    );
    let outcome = aggregator.aggregate(&request).await?;

    let ttest_report = report::format(&outcome.results, &outcome.excluded)
        .context("Failed to format the report")?;

    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(&ttest_report)?,
        OutputFormat::Markdown => {
            let metadata = report::ReportMetadata {
                organization_a: outcome.organization_a,
                organization_b: outcome.organization_b,
                method: outcome.method,
                alpha: config.general.alpha,
                analysis_date: Utc::now(),
                duration_seconds: start_time.elapsed().as_secs_f64(),
            };
            report::generate_markdown_report(&ttest_report, &metadata)
        }
    };

    std::fs::write(&config.general.output, &output).with_context(|| {
        format!(
            "Failed to write report to {}",
            config.general.output.display()
        )
    })?;

    let alpha = config.general.alpha;
    let significant = outcome
        .results
        .values()
        .filter(|r| r.is_significant(alpha))
        .count();

    println!("\n📊 Summary:");
    println!("   Columns compared: {}", outcome.results.len());
    println!("   Columns excluded: {}", outcome.excluded.len());
    println!("   Significant at {}: {}", alpha, significant);
    println!(
        "\n✅ Done! Report saved to: {}",
        config.general.output.display()
    );

    if args.fail_on_significant && significant > 0 {
        eprintln!(
            "\n⛔ {} column(s) differ at alpha = {}. Failing (exit code 2).",
            significant, alpha
        );
        return Ok(2);
    }

    Ok(0)
}

/// Create a node for each of the two requested organizations.
///
/// The request is validated first, so a malformed or duplicated
/// organization list fails before any dataset is read. Organizations
/// without configuration are left out; the aggregator reports them as
/// failed.
fn build_aggregator(config: &Config, request: &AggregationRequest) -> Result<Aggregator> {
    let (org_a, org_b) = analysis::aggregator::validate(request)?;

    let mut aggregator = Aggregator::new(config.general.method);
    let timeout = config.dispatch.timeout_seconds;

    for id in [org_a, org_b] {
        let Some(org) = config.organization(id) else {
            warn!("Organization {} is not configured", id);
            continue;
        };

        match org.location()? {
            NodeLocation::Dataset(path) => {
                let dataset = LocalDataset::from_csv_path(path).with_context(|| {
                    format!("Failed to load dataset of {}", org.display_name())
                })?;
                info!("{}: local dataset {}", org.display_name(), path.display());
                aggregator.register(Arc::new(LocalNode::new(
                    org.id,
                    dataset,
                    org.minimum_records(),
                    Duration::from_secs(timeout),
                )));
            }
            NodeLocation::Endpoint(url) => {
                info!("{}: remote node {}", org.display_name(), url);
                aggregator.register(Arc::new(HttpNode::new(org.id, url, timeout)?));
            }
        }
    }

    Ok(aggregator)
}

/// Handle --dry-run: validate the request and show dataset schemas.
fn handle_dry_run(config: &Config, request: &AggregationRequest) -> Result<i32> {
    println!("\n🔍 Dry run: validating request (no statistics computed)...\n");

    analysis::aggregator::validate(request)?;

    for id in &request.organizations_to_include {
        let Some(org) = config.organization(*id) else {
            bail!("Organization {} is not configured", id);
        };

        match org.location()? {
            NodeLocation::Dataset(path) => {
                let dataset = LocalDataset::from_csv_path(path).with_context(|| {
                    format!("Failed to load dataset of {}", org.display_name())
                })?;
                println!("   🏥 {} (local: {})", org.display_name(), path.display());
                for column in dataset.schema() {
                    println!("     - {} ({})", column.name, column.kind);
                }
            }
            NodeLocation::Endpoint(url) => {
                println!("   🌐 {} (remote: {})", org.display_name(), url);
            }
        }
    }

    if request.columns.is_empty() {
        println!("\n   Columns: all numeric columns at each organization");
    } else {
        println!("\n   Columns: {}", request.columns.join(", "));
    }

    println!("\n✅ Dry run complete. Nothing was dispatched.");
    Ok(0)
}

/// Run the organization side: print the partial response as JSON.
///
/// Failures are printed as the error payload an aggregator would receive.
fn run_partial(args: &PartialArgs) -> Result<i32> {
    let result = match LocalDataset::from_csv_path(&args.dataset) {
        Ok(dataset) => partial::compute(&dataset, &args.columns, args.minimum_records),
        Err(e) => {
            warn!("Failed to load dataset {}: {}", args.dataset.display(), e);
            Err(PartialError::Dataset {
                message: e.to_string(),
            })
        }
    };
    let exit_code = if result.is_ok() { 0 } else { 1 };

    let response = PartialResponse::from(result);
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(exit_code)
}

/// Load configuration from file or use defaults.
fn load_config(args: &AggregateArgs) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
