mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fluxgen_comfyui::messages::QueueEntry;
use fluxgen_comfyui::ComfyUIApi;
use fluxgen_pipeline::{Orchestrator, PipelineConfig};

use crate::cli::{Cli, Command, GenerateArgs};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "warn,fluxgen=info";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fluxgen starting");

    let config = PipelineConfig::from_env().context("invalid configuration")?;
    let orchestrator = Orchestrator::from_config(&config).with_context(|| {
        format!(
            "failed to load workflow template from {}",
            config.template_path.display()
        )
    })?;

    match cli.command {
        Command::Generate(args) => generate(&orchestrator, args).await,
        Command::Status => status(&orchestrator, &config).await,
        Command::Models => {
            let models = orchestrator
                .available_models()
                .await
                .context("failed to query engine models")?;
            print_json(&serde_json::to_value(models)?);
            Ok(())
        }
        Command::Queue => {
            let queue = orchestrator
                .queue_snapshot()
                .await
                .context("failed to query engine queue")?;
            let ids = |entries: &[QueueEntry]| -> Vec<String> {
                entries.iter().filter_map(|e| e.prompt_id.clone()).collect()
            };
            print_json(&json!({
                "running_count": queue.running_count(),
                "pending_count": queue.pending_count(),
                "running": ids(&queue.queue_running),
                "pending": ids(&queue.queue_pending),
            }));
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn generate(orchestrator: &Orchestrator<ComfyUIApi>, args: GenerateArgs) -> Result<()> {
    let params = args.into_params();

    // Ctrl-C stops waiting; the job itself keeps running on the engine.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match orchestrator.generate_with_cancel(&params, &cancel).await {
        Ok(output) => {
            print_json(&json!({
                "status": "ok",
                "task_id": output.task_id,
                "job": output.job,
                "seed": output.seed,
                "elapsed_secs": output.elapsed.as_secs_f64(),
                "artifact_path": output.artifact_path,
                "bytes": output.bytes.len(),
            }));
            Ok(())
        }
        Err(e) => {
            print_json(&json!({
                "status": "failed",
                "task_id": params.task_id,
                "kind": e.kind(),
                "job": e.job(),
                "elapsed_secs": e.elapsed().as_secs_f64(),
                "error": e.to_string(),
            }));
            Err(e.into())
        }
    }
}

async fn status(orchestrator: &Orchestrator<ComfyUIApi>, config: &PipelineConfig) -> Result<()> {
    let reachable = orchestrator.check_engine_reachable().await;
    print_json(&json!({
        "engine": config.engine.api_url,
        "reachable": reachable,
        "template": orchestrator.template().name(),
    }));
    if reachable {
        Ok(())
    } else {
        anyhow::bail!("engine at {} is not reachable", config.engine.api_url)
    }
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
