use clap::{Parser, Subcommand};

use fluxgen_core::params::{
    DEFAULT_GUIDANCE_SCALE, DEFAULT_HEIGHT, DEFAULT_STEPS, DEFAULT_WIDTH, RANDOM_SEED,
};
use fluxgen_core::{GenerationParams, TaskId};

/// fluxgen - text-to-image generation on a ComfyUI instance
#[derive(Debug, Parser)]
#[command(name = "fluxgen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate one image and wait for it
    Generate(GenerateArgs),

    /// Check whether the engine is reachable
    Status,

    /// List the model files the engine can load
    Models,

    /// Show the engine's running and pending jobs
    Queue,
}

#[derive(Debug, clap::Args)]
pub struct GenerateArgs {
    /// Text prompt (cut to 200 characters)
    #[arg(long)]
    pub prompt: String,

    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    #[arg(long, default_value_t = DEFAULT_STEPS)]
    pub steps: u32,

    #[arg(long, default_value_t = DEFAULT_GUIDANCE_SCALE)]
    pub guidance: f64,

    /// Sampler seed; -1 picks a random one
    #[arg(long, default_value_t = RANDOM_SEED, allow_negative_numbers = true)]
    pub seed: i64,

    /// Output key (letters, digits, '-' and '_'); random when omitted
    #[arg(long)]
    pub task_id: Option<TaskId>,
}

impl GenerateArgs {
    pub fn into_params(self) -> GenerationParams {
        GenerationParams::new(self.prompt, self.task_id.unwrap_or_else(TaskId::generate))
            .with_size(self.width, self.height)
            .with_steps(self.steps)
            .with_guidance_scale(self.guidance)
            .with_seed(self.seed)
    }
}
