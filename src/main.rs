use clap::{Parser, Subcommand};
use dotenv::dotenv;
use newsdesk::config::{NewsdeskConfig, ProviderConfig};
use newsdesk::engine::{cancel_pair, CancelHandle, RunId, RunState, TransitionTable};
use newsdesk::inference::{Inference, OpenAiBackend};
use newsdesk::nodes::standard_team;
use newsdesk::provider::{CapabilityProvider, ProviderManager, RemoteProvider, StdioProvider};
use newsdesk::store::{CheckpointLog, SimilarityIndex, SqliteStore};
use newsdesk::WorkflowEngine;

use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research, draft, vet and publish one article
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "newsdesk.yaml")]
        config: String,

        /// Override the configured topic
        #[arg(short, long)]
        topic: Option<String>,
    },
    /// Continue an interrupted run from its last checkpoint
    Resume {
        /// Path to the configuration file
        #[arg(short, long, default_value = "newsdesk.yaml")]
        config: String,

        /// Run id printed when the run started
        run_id: String,
    },
    /// List the tools advertised by the configured providers
    Tools {
        /// Path to the configuration file
        #[arg(short, long, default_value = "newsdesk.yaml")]
        config: String,
    },
    /// Print the checkpoint trail of a run
    History {
        /// Path to the configuration file
        #[arg(short, long, default_value = "newsdesk.yaml")]
        config: String,

        /// Run id to inspect
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run { config, topic } => {
            let config = NewsdeskConfig::load(&config)?;
            let topic = topic.unwrap_or_else(|| config.topic.clone());

            let (engine, cancel) = build_engine(&config).await?;
            cancel_on_ctrl_c(cancel);

            let state = RunState::new(topic.clone());
            let run_id = state.run_id;
            println!("Starting run {} on topic '{}'", run_id, topic);

            let finished = engine.run(state).await?;
            print_outcome(&finished);
        }
        Commands::Resume { config, run_id } => {
            let config = NewsdeskConfig::load(&config)?;
            let run_id: RunId = run_id.parse()?;

            let (engine, cancel) = build_engine(&config).await?;
            cancel_on_ctrl_c(cancel);

            println!("Resuming run {}", run_id);
            let finished = engine.resume(run_id).await?;
            print_outcome(&finished);
        }
        Commands::Tools { config } => {
            let config = NewsdeskConfig::load(&config)?;
            let manager = connect_providers(&config).await?;

            let mut tools = manager.list_tools().await?;
            tools.sort_by(|a, b| a.name.cmp(&b.name));
            for tool in tools {
                println!("{}: {}", tool.name, tool.description);
            }
        }
        Commands::History { config, run_id } => {
            let config = NewsdeskConfig::load(&config)?;
            let run_id: RunId = run_id.parse()?;

            let store = SqliteStore::open(&config.store_path)?;
            let trail = store.history(run_id).await?;
            if trail.is_empty() {
                println!("No checkpoints recorded for run {}", run_id);
                return Ok(());
            }

            for checkpoint in trail {
                let hint = checkpoint
                    .state
                    .last_hint
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "-".to_string());
                match checkpoint.error {
                    Some(error) => println!(
                        "step {:>3}  {:<13} {:<19} error: {}",
                        checkpoint.step, checkpoint.node, hint, error
                    ),
                    None => println!(
                        "step {:>3}  {:<13} {}",
                        checkpoint.step, checkpoint.node, hint
                    ),
                }
            }
        }
    }

    Ok(())
}

async fn connect_providers(
    config: &NewsdeskConfig,
) -> Result<Arc<ProviderManager>, Box<dyn std::error::Error + Send + Sync>> {
    let mut providers: Vec<Arc<dyn CapabilityProvider>> = Vec::new();
    for provider in &config.providers {
        match provider {
            ProviderConfig::Stdio {
                name,
                command,
                args,
            } => {
                log::info!("Connecting stdio provider '{}' ({})", name, command);
                providers.push(Arc::new(StdioProvider::connect(name, command, args).await?));
            }
            ProviderConfig::Remote { name, url, headers } => {
                log::info!("Connecting remote provider '{}' ({})", name, url);
                providers.push(Arc::new(
                    RemoteProvider::connect(name, url, headers.clone()).await?,
                ));
            }
        }
    }

    let manager = ProviderManager::connect(
        providers,
        Duration::from_secs(config.engine.call_timeout_secs),
    )
    .await?;
    Ok(Arc::new(manager))
}

async fn build_engine(
    config: &NewsdeskConfig,
) -> Result<(WorkflowEngine, CancelHandle), Box<dyn std::error::Error + Send + Sync>> {
    let capabilities: Arc<dyn CapabilityProvider> = connect_providers(config).await?;
    let inference: Arc<dyn Inference> = Arc::new(OpenAiBackend::from_config(&config.inference)?);
    let store = Arc::new(SqliteStore::open(&config.store_path)?);
    let index: Arc<dyn SimilarityIndex> = store.clone();
    let log: Arc<dyn CheckpointLog> = store;

    let (handle, token) = cancel_pair();
    let team = standard_team(config, inference, capabilities, index, token.clone());
    let engine = WorkflowEngine::new(
        team,
        TransitionTable::standard(),
        log,
        config.engine.clone(),
        token,
    );
    Ok((engine, handle))
}

/// Ctrl-C cancels cooperatively; the run stops at the next step boundary
/// with a checkpoint to resume from.
fn cancel_on_ctrl_c(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Ctrl-C received, canceling after the current step");
            cancel.cancel();
        }
    });
}

fn print_outcome(state: &RunState) {
    match &state.published_article {
        Some(article) => {
            println!("Run {} published:", state.run_id);
            println!("{}", article);
        }
        None => println!("Run {} finished without publishing", state.run_id),
    }
}
