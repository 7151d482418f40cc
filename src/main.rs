use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use flagseeker::challenge::{Benchmark, ChallengeDriver};
use flagseeker::config::AppConfig;
use flagseeker::metrics;
use flagseeker::ollama::ChatClient;
use flagseeker::sandbox::{DockerSandbox, Sandbox};
use flagseeker::tracing::{init_tracing, shutdown_tracing};
use flagseeker::AgentController;

/// Run an LLM agent against a benchmark of CTF challenges
#[derive(Debug, Parser)]
#[command(name = "flagseeker", version, about)]
struct Cli {
    /// Path to the JSON run configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Path to the JSON benchmark file
    #[arg(short, long)]
    benchmark: PathBuf,

    /// Don't stop the attackbox after exiting
    #[arg(short, long)]
    keep_running: bool,

    /// Write per-challenge results to this JSON file
    #[arg(short = 'o', long)]
    results: Option<PathBuf>,

    /// Only run these challenge ids (repeatable)
    #[arg(long = "only")]
    only: Vec<String>,

    /// Override max_tries from the config
    #[arg(long)]
    max_tries: Option<usize>,

    /// Dump Prometheus metrics to this file at exit
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Don't print planner output, command output and summaries
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(max_tries) = cli.max_tries {
        config.max_tries = max_tries;
    }
    if cli.quiet {
        config.verbose = false;
    }

    init_tracing("flagseeker", config.otlp_endpoint.as_deref())?;

    let mut benchmark = Benchmark::load(&cli.benchmark)?;
    info!(
        loaded = benchmark.len() + benchmark.skipped().len(),
        usable = benchmark.len(),
        "Benchmark loaded"
    );
    if !cli.only.is_empty() {
        let (selected, unknown) = benchmark.select(&cli.only);
        if !unknown.is_empty() {
            return Err(format!("unknown challenge ids: {}", unknown.join(", ")).into());
        }
        benchmark = selected;
    }

    let sandbox = Arc::new(
        DockerSandbox::new(&config.attackbox)
            .with_setup_commands(config.setup_commands.clone())
            .connect(&config.image, config.host_data_dir.clone())
            .await?,
    );
    sandbox.ensure_running().await?;

    let llm = Arc::new(ChatClient::new(&config.llm.base_url, &config.llm.model_id));
    info!(model = llm.model(), base_url = %config.llm.base_url, "Using Ollama");

    let controller = AgentController::new(
        llm,
        sandbox.clone(),
        config.prompts()?,
        config.agent_config(),
    );
    let driver = ChallengeDriver::new(controller, &config.target_text);

    println!("Starting to solve challenges...");
    let report = driver.run_benchmark(&benchmark).await;
    println!(
        "Solved {}/{} challenges ({} skipped), tokens in={} out={}",
        report.solved(),
        report.finished(),
        report.skipped.len(),
        report.tokens_in(),
        report.tokens_out()
    );

    if let Some(path) = &cli.results {
        match report.write_json(path) {
            Ok(()) => info!(path = %path.display(), "Results written"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to write results"),
        }
    }

    if let Some(path) = &cli.metrics_file {
        if let Err(e) = std::fs::write(path, metrics::gather_text()) {
            error!(path = %path.display(), error = %e, "Failed to write metrics");
        }
    }

    if !cli.keep_running {
        if let Err(e) = sandbox.stop().await {
            warn!(error = %e, "Failed to stop attackbox");
        }
    }

    shutdown_tracing();
    Ok(())
}
