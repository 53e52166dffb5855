// Subcommand handlers
//
// Each handler prints a short human summary to stdout; details go to tracing.

use anyhow::{Context, Result};
use std::path::Path;

use super::{
    Cli, Command, CombineArgs, ModelfileArgs, PrepareArgs, ScrapeArgs, ServeArgs, TrainArgs,
};
use crate::config::constants::SCRAPE_SAMPLE_SIZE;
use crate::config::{load_config, Config};
use crate::data::{self, ModelfileOptions, PrepareOptions};
use crate::providers::create_backend;
use crate::server::ChatServer;
use crate::training::{TrainingDriver, TrainingJob};

/// Load configuration and dispatch the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Scrape(args) => scrape(args),
        Command::Prepare(args) => prepare(args),
        Command::Combine(args) => combine(args),
        Command::Modelfile(args) => modelfile(args),
        Command::Train(args) => train(args, config).await,
        Command::Serve(args) => serve(args, config).await,
    }
}

fn scrape(args: ScrapeArgs) -> Result<()> {
    let report = data::scrape(&args.export_path, true)?;
    data::write_jsonl(&args.output, &report.messages)?;

    println!("Processed {} files", report.files);
    println!("Valid messages: {}", report.messages.len());
    println!("Errors: {}", report.errors);
    if report.malformed > 0 || report.empty > 0 {
        println!(
            "Skipped records: {} malformed, {} empty after cleaning",
            report.malformed, report.empty
        );
    }
    println!("Output saved to: {}", args.output.display());

    let sample = report.sample(SCRAPE_SAMPLE_SIZE);
    if !sample.is_empty() {
        println!("\nSample messages:");
        for line in sample {
            println!("  {}", line);
        }
    }
    Ok(())
}

fn prepare(args: PrepareArgs) -> Result<()> {
    let opts = PrepareOptions {
        system_prompt: args.system_prompt,
        format: args.format,
        max_examples: args.max_examples,
    };
    let summary = data::prepare(&args.input, &args.output, &opts)?;

    println!(
        "Loaded {} messages ({} malformed lines skipped)",
        summary.messages, summary.malformed
    );
    println!(
        "Built {} training examples from {} channels",
        summary.examples, summary.stats.channels
    );
    if summary.stats.skipped_pairs > 0 || summary.stats.dangling > 0 {
        println!(
            "Dropped {} empty pairs and {} unpaired trailing messages",
            summary.stats.skipped_pairs, summary.stats.dangling
        );
    }
    println!("Saved to {}", args.output.display());
    Ok(())
}

fn combine(args: CombineArgs) -> Result<()> {
    let combined = data::combine(args.inputs.as_slice(), args.max_examples, args.seed)?;

    for source in &combined.sources {
        if source.missing {
            println!("  {}: not found, skipped", source.path.display());
        } else {
            println!("  {}: {} records", source.path.display(), source.records);
        }
    }
    data::write_jsonl(&args.output, &combined.examples)?;

    println!(
        "Combined {} records, kept {}",
        combined.total,
        combined.examples.len()
    );
    println!("Saved to {}", args.output.display());
    Ok(())
}

fn modelfile(args: ModelfileArgs) -> Result<()> {
    let mut opts = ModelfileOptions {
        base_model: args.base_model,
        max_messages: args.max_messages,
        ..Default::default()
    };
    if let Some(system) = args.system {
        opts.system = system;
    }

    let lines = data::modelfile::convert(&args.input, &args.output, &opts)?;

    println!("Wrote {} messages to {}", lines, args.output.display());
    println!("\nCreate the model with:");
    println!(
        "  ollama create {} -f {}",
        model_name_hint(&args.output),
        args.output.display()
    );
    Ok(())
}

async fn train(args: TrainArgs, config: Config) -> Result<()> {
    let mut job = TrainingJob::from_config(args.dataset, args.output_dir, &config.training);
    if let Some(base_model) = args.base_model {
        job.base_model = base_model;
    }
    if let Some(rank) = args.rank {
        job.hyperparameters.rank = rank;
    }
    if let Some(batch_size) = args.batch_size {
        job.hyperparameters.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        job.hyperparameters.learning_rate = learning_rate;
    }
    if let Some(epochs) = args.epochs {
        job.hyperparameters.epochs = epochs;
    }
    if let Some(max_examples) = args.max_examples {
        job.max_examples = max_examples;
    }

    let driver = TrainingDriver::from_config(&config.training);
    let metrics = driver.run(&job).await.context("Training failed")?;

    println!(
        "Trained on {} examples ({} held out) in {:.0}s",
        metrics.train_examples, metrics.validation_examples, metrics.duration_secs
    );
    if let Some(checkpoint) = &metrics.resumed_from {
        println!("Resumed from {}", checkpoint.display());
    }
    println!("Adapter: {}", metrics.adapter_dir.display());
    println!("Run id: {}", metrics.run_id);
    Ok(())
}

async fn serve(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(backend) = args.backend {
        config.server.backend = backend;
    }
    if let Some(model) = args.model {
        config.server.default_model = model;
    }
    if let Some(path) = args.model_path {
        config.local.model_path = Some(path);
    }

    let backend = create_backend(&config).await?;
    ChatServer::new(&config.server, backend).serve().await
}

/// Model name suggested in the `ollama create` hint.
fn model_name_hint(output: &Path) -> &str {
    output
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && !s.starts_with("Modelfile"))
        .unwrap_or("chatmimic")
}
