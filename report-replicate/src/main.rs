mod config;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use factor_core::PerformanceReport;
use factor_data_services::{BacktestEngine, DataStore, ProcessBacktestRunner, ProcessRunnerConfig};
use factor_research::{
    LlmClient, LlmConfig, LlmRequester, ModelRegistry, ResearchProcessor, RetryPolicy, Settings,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::ReplicateConfig;
use pipeline::ReplicationPipeline;

/// Research Report Replicator
///
/// Reads a quantitative research report, extracts its factor logic with an
/// LLM, generates strategy code for it, and backtests that code.
#[derive(Parser, Debug)]
#[command(name = "report-replicate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Research report file (.txt, .md, .pdf, .docx)
    #[arg(short, long)]
    report: PathBuf,

    /// Model preset or identifier (defaults to DEFAULT_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Backtest start date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// Backtest end date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Data directory for all artifacts (defaults to DATA_PATH or ./data)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only extract factor logic, skip code generation and backtest
    #[arg(long)]
    extract_only: bool,

    /// Refinement rounds allowed after a failed backtest
    #[arg(long, default_value = "0")]
    max_refinements: u32,

    /// Python interpreter used to run generated strategies
    #[arg(long, default_value = "python3")]
    python: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    fn into_config(self, mut config: ReplicateConfig) -> Result<ReplicateConfig> {
        if let Some(date) = &self.start_date {
            config.set_start_date(date)?;
        }
        if let Some(date) = &self.end_date {
            config.set_end_date(date)?;
        }
        if let Some(dir) = self.output {
            config.data_dir = dir;
        }
        config.model = self.model;
        config.extract_only = self.extract_only;
        config.max_refinements = self.max_refinements;
        config.python = self.python;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "report_replicate={0},factor_research={0},factor_data_services={0}",
                cli.log_level
            ))
        }))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Replication failed: {:#}", e);
            eprintln!("Error: {:?}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let report_path = cli.report.clone();
    let config = cli.into_config(ReplicateConfig::from_env()?)?;
    let settings = Settings::from_env();

    let registry = ModelRegistry::from_settings(&settings);
    let model = registry.lookup(config.model.as_deref());

    tracing::info!("📄 Research Report Replicator");
    tracing::info!("Configuration:");
    tracing::info!("  Report: {}", report_path.display());
    tracing::info!("  Model: {}", model.identifier);
    tracing::info!("  Data directory: {}", config.data_dir.display());
    tracing::info!(
        "  Backtest window: {} .. {} (capital {})",
        config.window.start_date,
        config.window.end_date,
        config.window.initial_capital
    );
    tracing::info!("  Max refinements: {}", config.max_refinements);

    let client = LlmClient::new(LlmConfig::default()).context("Failed to initialize LLM client")?;
    let requester = LlmRequester::new(Arc::new(client), RetryPolicy::default());
    let processor = ResearchProcessor::new(model, requester);

    let runner = ProcessBacktestRunner::new(ProcessRunnerConfig {
        interpreter: config.python.clone(),
        ..ProcessRunnerConfig::default()
    });
    let engine = BacktestEngine::new(config.window.clone(), Arc::new(runner));

    let mut pipeline = ReplicationPipeline::new(
        DataStore::new(&config.data_dir),
        processor,
        engine,
        config.max_refinements,
    );

    let report = pipeline.process_report(&report_path).await?;
    println!("Processed report saved to: {}", report.processed_file.display());
    println!("Factor logic saved to: {}", report.factor_file.display());

    if config.extract_only {
        println!("\nFactor logic extraction complete!");
        return Ok(());
    }

    let outcome = pipeline.run_backtest(&report).await?;
    println!(
        "Backtest code saved to: {} ({} refinement rounds)",
        outcome.code_file.display(),
        outcome.refinements
    );

    match (&outcome.performance, &outcome.result_file) {
        (Some(performance), Some(result_file)) => {
            println!("Backtest result saved to: {}", result_file.display());
            print_performance(performance);
            println!("\nReport replication complete!");
        }
        _ => {
            println!("\nBacktest execution failed; check the logs and the generated code.");
        }
    }

    Ok(())
}

fn print_performance(performance: &PerformanceReport) {
    println!("\n=== Backtest Result ===");
    println!("Total return:      {:.4}", performance.total_return);
    println!("Annualized return: {:.4}", performance.annualized_return);
    println!("Sharpe ratio:      {:.4}", performance.sharpe_ratio);
    println!("Max drawdown:      {:.4}", performance.max_drawdown);
}
