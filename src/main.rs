use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use collectbot_eval::{
    cli::{execute_command, Commands},
    config::{Config, LogFormat},
    llm::GroqClient,
    storage::{open_store, Artifacts},
    Orchestrator,
};

/// Self-correcting evaluation loop for debt-collection bot scripts
#[derive(Parser, Debug)]
#[command(name = "collectbot-eval", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
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
        backend = ?config.store.backend,
        "Collectbot eval starting..."
    );

    // Initialize artifact store
    let store = match open_store(&config.store).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to open artifact store");
            return Err(e.into());
        }
    };
    let mut artifacts = Artifacts::new(store);
    if let Some(path) = &config.eval.seed_script_path {
        artifacts = artifacts.with_seed_script_path(path.clone());
    }

    // Initialize Groq client
    let client = match GroqClient::new(&config.groq, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %c.base_url(), model = %config.groq.model, "Groq client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Groq client");
            return Err(e.into());
        }
    };

    let orchestrator = Orchestrator::new(Arc::new(client), config.eval.clone(), artifacts);

    // Ctrl-C stops the run between iterations
    let stop = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current iteration");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let result = execute_command(cli.command, &orchestrator, &config.eval, &stop).await;
    if result.exit_code == 0 {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
    }
    std::process::exit(result.exit_code);
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
