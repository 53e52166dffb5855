// Command-line interface
//
// One subcommand per pipeline stage, plus `serve`.

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::constants::*;
use crate::config::BackendKind;
use crate::data::ExampleFormat;

pub use commands::run;

/// chatmimic - turn chat exports into a fine-tuned persona and serve it
#[derive(Debug, Parser)]
#[command(name = "chatmimic", version, about)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (default: ~/.chatmimic/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract and clean messages from a chat export directory
    Scrape(ScrapeArgs),
    /// Pair cleaned messages into training conversations
    Prepare(PrepareArgs),
    /// Merge datasets, shuffle and cap
    Combine(CombineArgs),
    /// Write an Ollama Modelfile from a chat dataset
    Modelfile(ModelfileArgs),
    /// Fine-tune a LoRA adapter with the configured framework
    Train(TrainArgs),
    /// Serve the chat endpoint
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Export directory to walk
    pub export_path: PathBuf,

    #[arg(short, long, default_value = DEFAULT_SCRAPE_OUTPUT)]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct PrepareArgs {
    /// Cleaned message file (JSONL)
    pub input: PathBuf,

    #[arg(short, long, default_value = DEFAULT_PREPARE_OUTPUT)]
    pub output: PathBuf,

    /// System prompt prepended to every conversation
    #[arg(long)]
    pub system_prompt: Option<String>,

    #[arg(long, value_enum, default_value_t = ExampleFormat::Chat)]
    pub format: ExampleFormat,

    /// Keep at most this many examples
    #[arg(long)]
    pub max_examples: Option<usize>,
}

#[derive(Debug, Args)]
pub struct CombineArgs {
    /// Datasets to merge; missing files are skipped
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(short, long, default_value = DEFAULT_COMBINE_OUTPUT)]
    pub output: PathBuf,

    #[arg(long, default_value_t = DEFAULT_COMBINE_CAP)]
    pub max_examples: usize,

    /// Seed for a reproducible shuffle
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ModelfileArgs {
    /// Chat-format dataset (JSONL)
    pub input: PathBuf,

    #[arg(short, long, default_value = DEFAULT_MODELFILE_OUTPUT)]
    pub output: PathBuf,

    /// Conversation pairs to include (at most 2x this many MESSAGE lines)
    #[arg(long, default_value_t = DEFAULT_MODELFILE_MAX_MESSAGES)]
    pub max_messages: usize,

    #[arg(long, default_value = DEFAULT_MODELFILE_BASE)]
    pub base_model: String,

    /// System prompt for the SYSTEM block
    #[arg(long)]
    pub system: Option<String>,
}

#[derive(Debug, Args)]
pub struct TrainArgs {
    /// Training dataset (JSONL)
    pub dataset: PathBuf,

    #[arg(long)]
    pub base_model: Option<String>,

    #[arg(long, default_value = DEFAULT_TRAIN_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// LoRA rank
    #[arg(long)]
    pub rank: Option<u32>,

    #[arg(long)]
    pub batch_size: Option<u32>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    #[arg(long)]
    pub epochs: Option<u32>,

    #[arg(long)]
    pub max_examples: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:8000)
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Model used when a request does not name one
    #[arg(long)]
    pub model: Option<String>,

    /// Fine-tuned model or adapter directory for the local backend
    #[arg(long)]
    pub model_path: Option<PathBuf>,
}
