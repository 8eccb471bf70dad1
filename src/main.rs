use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sequential_analysis::{
    analysis::{AnalysisController, Article},
    config::{Config, LogFormat},
    llm::LlmClient,
    server::{AppState, RpcServer},
};

/// Multi-stage LLM analysis of news articles.
#[derive(Parser, Debug)]
#[command(name = "sequential-analysis", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve JSON-RPC requests on stdin/stdout (default)
    Serve,

    /// Analyze one article and print the finished session as JSON
    Analyze {
        /// Path to a JSON file holding the article
        article: PathBuf,

        /// Number of stages to run
        #[arg(long)]
        depth: Option<u32>,

        /// Minimum stage confidence required to continue
        #[arg(long)]
        threshold: Option<f64>,

        /// Skip cross-reference validation
        #[arg(long)]
        no_cross_reference: bool,

        /// Skip hypothesis generation
        #[arg(long)]
        no_hypotheses: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.llm.model,
        "Sequential analysis starting..."
    );

    let llm = match LlmClient::new(&config.llm, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.llm.base_url, "LLM client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize LLM client");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = Arc::new(AppState::new(config, Arc::new(llm)));
            let server = RpcServer::new(state);

            info!("Server ready, waiting for requests on stdin...");

            if let Err(e) = server.run().await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }

            info!("Server shutdown complete");
        }
        Command::Analyze {
            article,
            depth,
            threshold,
            no_cross_reference,
            no_hypotheses,
        } => {
            let raw = tokio::fs::read_to_string(&article)
                .await
                .with_context(|| format!("reading {}", article.display()))?;
            let mut article: Article =
                serde_json::from_str(&raw).context("article file is not a valid article")?;
            if article.id.is_empty() {
                article.id = uuid::Uuid::new_v4().to_string();
            }

            let mut analysis = config.analysis.clone();
            if let Some(depth) = depth {
                analysis = analysis.with_depth(depth);
            }
            if let Some(threshold) = threshold {
                analysis = analysis.with_confidence_threshold(threshold);
            }
            if no_cross_reference {
                analysis = analysis.with_cross_reference(false);
            }
            if no_hypotheses {
                analysis = analysis.with_hypotheses(false);
            }

            let controller = AnalysisController::new(Arc::new(llm));
            let session = controller.start_analysis(article, analysis).await?;
            let finished = controller.wait_for_completion(&session.id).await?;

            info!(
                session_id = %finished.id,
                status = %finished.status,
                stages = finished.stages.len(),
                "Analysis finished"
            );
            println!("{}", serde_json::to_string_pretty(&finished)?);
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
