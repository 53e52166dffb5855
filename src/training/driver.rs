// Training driver
//
// Prepares a run directory (split dataset, training_args.json), launches the
// external fine-tuning framework and records the run in metrics.json.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkpoint::latest_checkpoint;
use super::dataset::split;
use super::hyperparams::Hyperparameters;
use crate::config::constants::*;
use crate::config::TrainingConfig;
use crate::data::{read_jsonl, write_jsonl, TrainingExample};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("dataset not found: {0}")]
    DatasetMissing(PathBuf),

    #[error("dataset has no usable examples: {0}")]
    EmptyDataset(PathBuf),

    #[error("invalid training settings: {0}")]
    InvalidSettings(String),

    #[error("no training command configured")]
    NoCommand,

    #[error("failed to launch training framework `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoints written before the failure are left in the output directory.
    #[error("training framework exited with {status}\n{stderr}")]
    Framework { status: ExitStatus, stderr: String },

    #[error("training interrupted; partial output left in {0}")]
    Interrupted(PathBuf),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One fine-tuning run.
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub dataset: PathBuf,
    pub base_model: String,
    pub output_dir: PathBuf,
    pub hyperparameters: Hyperparameters,
    pub max_examples: usize,
    pub validation_fraction: f64,
    pub seed: u64,
}

impl TrainingJob {
    /// Job with the configured model, limits and hyperparameters.
    pub fn from_config(dataset: PathBuf, output_dir: PathBuf, config: &TrainingConfig) -> Self {
        Self {
            dataset,
            base_model: config.base_model.clone(),
            output_dir,
            hyperparameters: config.hyperparameters.clone(),
            max_examples: config.max_examples,
            validation_fraction: config.validation_fraction,
            seed: config.seed,
        }
    }

    pub fn adapter_dir(&self) -> PathBuf {
        self.output_dir.join(ADAPTER_DIR)
    }
}

/// Contents of `training_args.json`, read by the framework.
#[derive(Debug, Serialize)]
struct TrainingArgs<'a> {
    base_model: &'a str,
    train_file: &'a Path,
    validation_file: &'a Path,
    output_dir: &'a Path,
    adapter_dir: &'a Path,
    seed: u64,
    /// batch_size * gradient_accumulation
    effective_batch_size: u32,
    #[serde(flatten)]
    hyperparameters: &'a Hyperparameters,
}

/// Summary written to `<output>/metrics.json` after a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub base_model: String,
    pub dataset: PathBuf,
    pub dataset_sha256: String,
    pub hyperparameters: Hyperparameters,
    pub train_examples: usize,
    pub validation_examples: usize,
    pub malformed_records: usize,
    pub resumed_from: Option<PathBuf>,
    pub adapter_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// `train_metrics.json` reported by the framework, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<serde_json::Value>,
}

/// Launches the configured framework command for a [`TrainingJob`].
pub struct TrainingDriver {
    command: Vec<String>,
}

impl TrainingDriver {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.command.clone())
    }

    /// Run `job` to completion.
    pub async fn run(&self, job: &TrainingJob) -> Result<RunMetrics, TrainingError> {
        job.hyperparameters
            .validate()
            .map_err(|e| TrainingError::InvalidSettings(e.to_string()))?;
        let (program, base_args) = self.command.split_first().ok_or(TrainingError::NoCommand)?;

        if !job.dataset.exists() {
            return Err(TrainingError::DatasetMissing(job.dataset.clone()));
        }

        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, dataset = %job.dataset.display(), base_model = %job.base_model, "Starting training run");

        let bytes = fs::read(&job.dataset)
            .with_context(|| format!("Failed to read {}", job.dataset.display()))?;
        let dataset_sha256 = format!("{:x}", Sha256::digest(&bytes));

        let read = read_jsonl::<TrainingExample>(&job.dataset)?;
        if read.records.is_empty() {
            return Err(TrainingError::EmptyDataset(job.dataset.clone()));
        }
        let available = read.records.len();
        let parts = split(read.records, job.max_examples, job.validation_fraction, job.seed);
        if available > job.max_examples {
            info!(available, kept = job.max_examples, "Sampled examples for training");
        }

        fs::create_dir_all(&job.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", job.output_dir.display())
        })?;
        let train_file = job.output_dir.join(TRAIN_FILE);
        let validation_file = job.output_dir.join(VALIDATION_FILE);
        let args_file = job.output_dir.join(TRAINING_ARGS_FILE);
        let adapter_dir = job.adapter_dir();

        write_jsonl(&train_file, &parts.train)?;
        write_jsonl(&validation_file, &parts.validation)?;
        let args = TrainingArgs {
            base_model: &job.base_model,
            train_file: &train_file,
            validation_file: &validation_file,
            output_dir: &job.output_dir,
            adapter_dir: &adapter_dir,
            seed: job.seed,
            effective_batch_size: job.hyperparameters.effective_batch_size(),
            hyperparameters: &job.hyperparameters,
        };
        let args_json =
            serde_json::to_string_pretty(&args).context("Failed to serialize training args")?;
        fs::write(&args_file, args_json)
            .with_context(|| format!("Failed to write {}", args_file.display()))?;

        info!(
            train = parts.train.len(),
            validation = parts.validation.len(),
            effective_batch = args.effective_batch_size,
            "Wrote training split"
        );

        let resumed_from = latest_checkpoint(&job.output_dir);
        if let Some(ref checkpoint) = resumed_from {
            info!(checkpoint = %checkpoint.display(), "Resuming from checkpoint");
        }

        let mut cmd = Command::new(program);
        cmd.args(base_args)
            .arg("--train-file")
            .arg(&train_file)
            .arg("--validation-file")
            .arg(&validation_file)
            .arg("--output-dir")
            .arg(&job.output_dir)
            .arg("--args-file")
            .arg(&args_file);
        if let Some(ref checkpoint) = resumed_from {
            cmd.arg("--resume-from").arg(checkpoint);
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = ?cmd.as_std(), "Launching training framework");
        let mut child = cmd.spawn().map_err(|source| TrainingError::Launch {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().context("Framework stdout was not captured")?;
        let stderr = child.stderr.take().context("Framework stderr was not captured")?;

        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "chatmimic::trainer", "{}", line);
            }
        });

        // Keep only the tail for the error report
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "chatmimic::trainer", "{}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let status = tokio::select! {
            status = child.wait() => status.context("Failed to wait for training framework")?,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping training framework");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill training framework: {}", e);
                }
                return Err(TrainingError::Interrupted(job.output_dir.clone()));
            }
        };

        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(TrainingError::Framework {
                status,
                stderr: Vec::from(stderr_tail).join("\n"),
            });
        }

        if !adapter_dir.exists() {
            warn!(path = %adapter_dir.display(), "Framework finished without writing an adapter");
        }

        let framework = read_framework_metrics(&job.output_dir.join(FRAMEWORK_METRICS_FILE));
        let finished_at = Utc::now();
        let metrics = RunMetrics {
            run_id,
            base_model: job.base_model.clone(),
            dataset: job.dataset.clone(),
            dataset_sha256,
            hyperparameters: job.hyperparameters.clone(),
            train_examples: parts.train.len(),
            validation_examples: parts.validation.len(),
            malformed_records: read.malformed,
            resumed_from,
            adapter_dir,
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            framework,
        };

        let metrics_path = job.output_dir.join(METRICS_FILE);
        let json = serde_json::to_string_pretty(&metrics).context("Failed to serialize metrics")?;
        fs::write(&metrics_path, json)
            .with_context(|| format!("Failed to write {}", metrics_path.display()))?;

        info!(%run_id, duration_secs = metrics.duration_secs, "Training run complete");
        Ok(metrics)
    }
}

fn read_framework_metrics(path: &Path) -> Option<serde_json::Value> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path)
        .map_err(|e| anyhow!(e))
        .and_then(|s| serde_json::from_str(&s).map_err(|e| anyhow!(e)))
    {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), "Ignoring unreadable framework metrics: {}", e);
            None
        }
    }
}
