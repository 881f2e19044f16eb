//! CLI command definitions for catalog-audit.
//!
//! Two commands: `run` performs one reconciliation pass over a product batch,
//! `check` classifies a single product. Connection settings come from the
//! environment (see [`AuditConfig::from_env`]); flags override them.

use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::audit::Problem;
use crate::pipeline::{AuditConfig, AuditOrchestrator};
use crate::scheduler::{FetchFailurePolicy, Job};
use crate::storage::SamplingOrder;

/// Audits storefront listings against the authoritative catalog.
#[derive(Parser, Debug)]
#[command(name = "catalog-audit")]
#[command(about = "Reconcile storefront listings, variants and price/stock with the catalog")]
#[command(version)]
#[command(
    long_about = "catalog-audit samples products from the catalog database, looks each one up on the storefront and compares listings, variants and price/stock.\n\nFindings are summarised per category. With --fix, price/stock corrections are published to the message bus.\n\nExample usage:\n  catalog-audit run --batch-size 200 --workers 2 --fix"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run one reconciliation pass.
    Run(RunArgs),

    /// Check a single product and print its classification.
    Check(CheckArgs),
}

/// Arguments for `catalog-audit run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Maximum number of products to check.
    #[arg(short = 'n', long)]
    pub batch_size: Option<usize>,

    /// Number of concurrent workers.
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Product sampling order (random, none).
    #[arg(long)]
    pub sampling: Option<SamplingOrder>,

    /// Handling of storefront/pricing failures (isolate, abort).
    #[arg(long)]
    pub fetch_failures: Option<FetchFailurePolicy>,

    /// Publish price/stock corrections to the message bus.
    #[arg(long)]
    pub fix: bool,

    /// Output the report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `catalog-audit check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Business key (model number) of the product.
    pub model_no: String,

    /// Authoritative product id.
    #[arg(short = 'p', long)]
    pub product_id: i64,

    /// Output the result as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_audit_command(args).await,
        Commands::Check(args) => run_check_command(args).await,
    }
}

/// Applies `run` flags on top of the environment configuration.
fn apply_run_args(mut config: AuditConfig, args: &RunArgs) -> AuditConfig {
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if let Some(sampling) = args.sampling {
        config = config.with_sampling(sampling);
    }
    if let Some(policy) = args.fetch_failures {
        config = config.with_fetch_failures(policy);
    }
    if args.fix {
        config = config.with_fix(true);
    }
    config
}

async fn run_audit_command(args: RunArgs) -> anyhow::Result<()> {
    let config = apply_run_args(AuditConfig::from_env()?, &args);
    config.validate()?;

    let orchestrator = AuditOrchestrator::connect(config).await?;
    let outcome = orchestrator.run().await?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&outcome)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        println!("{}", outcome.report);
    }

    outcome.ensure_published()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    product_id: i64,
    model_no: &'a str,
    category: String,
    problem: &'a Problem,
}

async fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    // A single check never publishes.
    let config = AuditConfig::from_env()?.with_fix(false);
    let orchestrator = AuditOrchestrator::connect(config).await?;

    let job = Job::new(args.product_id, args.model_no.clone());
    info!(product_id = job.id, model_number = %job.model_number, "Checking product");
    let problem = orchestrator.check_one(&job).await?;

    if args.json {
        let output = CheckOutput {
            product_id: job.id,
            model_no: &job.model_number,
            category: problem.category().to_string(),
            problem: &problem,
        };
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        println!("{} ({}): {}", job.model_number, job.id, problem.category());
        for correction in problem.corrections() {
            println!(
                "  {} -> price {} qty {} ({})",
                correction.sku, correction.price, correction.qty, correction.source
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["catalog-audit", "run"]).unwrap();
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Run(args) => {
                assert!(args.batch_size.is_none());
                assert!(args.workers.is_none());
                assert!(!args.fix);
                assert!(!args.json);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "catalog-audit",
            "run",
            "--batch-size",
            "50",
            "-w",
            "4",
            "--sampling",
            "none",
            "--fetch-failures",
            "abort",
            "--fix",
            "--json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = apply_run_args(AuditConfig::default(), &args);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.sampling, SamplingOrder::Unordered);
        assert_eq!(config.fetch_failures, FetchFailurePolicy::Abort);
        assert!(config.fix_enabled);
    }

    #[test]
    fn test_parse_check() {
        let cli =
            Cli::try_parse_from(["catalog-audit", "check", "ABC123", "--product-id", "1"]).unwrap();
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.model_no, "ABC123");
                assert_eq!(args.product_id, 1);
            }
            other => panic!("expected check, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_check_requires_product_id() {
        assert!(Cli::try_parse_from(["catalog-audit", "check", "ABC123"]).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["catalog-audit", "run", "--fetch-failures", "retry"]).is_err());
    }
}
