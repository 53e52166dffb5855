// LoRA fine-tuning hyperparameters

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Settings handed to the fine-tuning framework through `training_args.json`.
///
/// Every field has a default so a partial `[training.hyperparameters]` table in the
/// config file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// LoRA rank
    pub rank: u32,
    /// LoRA scaling numerator (effective scale is alpha / rank)
    pub alpha: u32,
    pub dropout: f64,
    pub batch_size: u32,
    /// Effective batch is batch_size * gradient_accumulation
    pub gradient_accumulation: u32,
    pub learning_rate: f64,
    pub epochs: u32,
    /// Token limit per example; longer examples are truncated
    pub max_length: u32,
    pub target_modules: Vec<String>,
    pub weight_decay: f64,
    pub warmup_ratio: f64,
    pub save_steps: u32,
    pub save_total_limit: u32,
    pub logging_steps: u32,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            rank: 16,
            alpha: 32,
            dropout: 0.05,
            batch_size: 4,
            gradient_accumulation: 8,
            learning_rate: 2e-5,
            epochs: 3,
            max_length: 1024,
            target_modules: vec!["q_proj".to_string(), "v_proj".to_string()],
            weight_decay: 0.01,
            warmup_ratio: 0.03,
            save_steps: 200,
            save_total_limit: 3,
            logging_steps: 10,
        }
    }
}

impl Hyperparameters {
    pub fn effective_batch_size(&self) -> u32 {
        self.batch_size.saturating_mul(self.gradient_accumulation)
    }

    /// Reject settings no framework can run with.
    pub fn validate(&self) -> Result<()> {
        if self.rank == 0 {
            bail!("LoRA rank must be at least 1");
        }
        if self.batch_size == 0 || self.gradient_accumulation == 0 {
            bail!("batch_size and gradient_accumulation must be at least 1");
        }
        if self.epochs == 0 {
            bail!("epochs must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            bail!("learning_rate must be a positive number, got {}", self.learning_rate);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if self.target_modules.is_empty() {
            bail!("at least one target module is required");
        }
        Ok(())
    }
}
