//! Bid optimizer service.
//!
//! - CLI arguments and TOML config file support
//! - Per-context pricing spaces with periodic recalibration
//! - Structured logging with tracing
//! - HTTP API (`/optimize`, `/feedback`, `/space`, `/health`)

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use bid_optimizer::optimizer::background::{BackgroundSchedule, BackgroundTasks};
use bid_optimizer::optimizer::calibration::Recalibrator;
use bid_optimizer::optimizer::config::{load_contexts, ServiceConfig};
use bid_optimizer::optimizer::infra::logging::{init_logging, LogFormat};
use bid_optimizer::optimizer::infra::serve;
use bid_optimizer::PricingService;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "bid_optimizer")]
#[command(version, about = "Online bid price optimizer", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "bid_optimizer.toml")]
    config: String,

    /// Override listen host
    #[arg(long)]
    host: Option<String>,

    /// Override listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override space description file (JSON)
    #[arg(long)]
    space_desc_file: Option<String>,

    /// Override context range file (JSON)
    #[arg(long)]
    ranges_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BID_OPTIMIZER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Log file path (logs to both file and stdout)
    #[arg(long)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a sample config file
    GenerateConfig {
        /// Output file path
        #[arg(short, long, default_value = "bid_optimizer.toml")]
        output: String,
    },
    /// Validate config and context files without serving
    ValidateConfig,
    /// Run the service (default)
    Run,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::GenerateConfig { output }) => {
            generate_sample_config(output)?;
            return Ok(());
        }
        Some(Commands::ValidateConfig) => {
            let config = load_config(&cli)?;
            config.validate()?;
            let contexts = load_contexts(&config.contexts)?;
            println!("Configuration is valid ({} contexts):", contexts.len());
            for ctx in &contexts {
                println!(
                    "  {} [{}, {}]",
                    ctx.context_id, ctx.min_price, ctx.max_price
                );
            }
            return Ok(());
        }
        Some(Commands::Run) | None => {}
    }

    let config = load_config(&cli)?;
    let _log_guards = init_logging(&config.logging, None)?;

    let service = Arc::new(PricingService::from_config(&config)?);

    let recalibrator = Recalibrator::new(
        config.recalibration.learner.trainer(),
        config.recalibration.min_samples,
    );
    let background = BackgroundTasks::spawn(
        Arc::clone(&service),
        recalibrator,
        BackgroundSchedule {
            recalibration_interval: config.recalibration.interval(),
            ledger_sweep_interval: config.ledger.sweep_interval(),
            ledger_retention: config.ledger.retention(),
        },
    );

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {addr}: {e}"))?;

    info!(
        addr = %addr,
        contexts = service.context_count(),
        learner = ?config.recalibration.learner,
        "Bid optimizer started"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };

    let served = serve(listener, Arc::clone(&service), shutdown).await;
    background.shutdown().await;
    served?;

    info!("Bid optimizer stopped");
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Load the TOML config (defaults when missing) and apply CLI overrides.
fn load_config(cli: &Cli) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::load(&cli.config)?;

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(path) = &cli.space_desc_file {
        config.contexts.space_desc_file = Some(path.into());
    }
    if let Some(path) = &cli.ranges_file {
        config.contexts.ranges_file = Some(path.into());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.stdout_format = format;
    }
    if let Some(file) = &cli.log_file {
        config.logging.log_file = Some(file.clone());
    }

    Ok(config)
}

fn generate_sample_config(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let content = ServiceConfig::sample().to_toml()?;

    let with_comments = format!(
        r#"# Bid Optimizer Configuration
# See: cargo run -- --help
#
# Contexts come from [contexts]: either `space_desc_file` (JSON list of
# {{"context_hash", "min_price"?, "max_price"?}}) with an optional
# `ranges_file` ({{"context_hash", "range": [min, max]}}), or inline
# [[contexts.spaces]] tables as below.
#
# Learners: "boosted_stumps" (default) or "logistic".

{content}"#
    );

    std::fs::write(path, with_comments)?;
    println!("Generated sample config: {path}");
    Ok(())
}
