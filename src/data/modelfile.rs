// Ollama Modelfile export
//
// Turns a chat dataset into `MESSAGE` lines so a model can be created with
// `ollama create <name> -f <file>` without a training run.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

use super::example::{Role, TrainingExample};
use super::jsonl::read_jsonl;
use crate::config::constants::{
    DEFAULT_MODELFILE_BASE, DEFAULT_MODELFILE_MAX_MESSAGES, DEFAULT_MODELFILE_SYSTEM,
    MODELFILE_NUM_CTX,
};

#[derive(Debug, Clone)]
pub struct ModelfileOptions {
    pub base_model: String,
    pub system: String,
    /// MESSAGE lines are capped at twice this value. Skipped turns do not count.
    pub max_messages: usize,
}

impl Default for ModelfileOptions {
    fn default() -> Self {
        Self {
            base_model: DEFAULT_MODELFILE_BASE.to_string(),
            system: DEFAULT_MODELFILE_SYSTEM.to_string(),
            max_messages: DEFAULT_MODELFILE_MAX_MESSAGES,
        }
    }
}

/// Render the Modelfile text. Returns the text and the number of `MESSAGE` lines.
pub fn render(examples: &[TrainingExample], opts: &ModelfileOptions) -> (String, usize) {
    let mut out = String::new();
    let _ = writeln!(out, "# Modelfile");
    let _ = writeln!(out, "FROM {}", opts.base_model);
    let _ = writeln!(out);
    let _ = writeln!(out, "SYSTEM \"\"\"");
    let _ = writeln!(out, "{}", opts.system.trim());
    let _ = writeln!(out, "\"\"\"");
    let _ = writeln!(out);
    let _ = writeln!(out, "PARAMETER num_ctx {}", MODELFILE_NUM_CTX);
    let _ = writeln!(out);

    let limit = opts.max_messages.saturating_mul(2);
    let mut count = 0;

    'examples: for example in examples {
        for turn in example.to_turns() {
            if count >= limit {
                break 'examples;
            }
            if turn.role == Role::System {
                continue;
            }
            let content = escape(&turn.content);
            if content.trim().is_empty() {
                continue;
            }
            let _ = writeln!(out, "MESSAGE {} \"{}\"", turn.role.as_str(), content);
            count += 1;
        }
    }

    (out, count)
}

/// Read a dataset from `input` and write its Modelfile to `output`.
pub fn convert(input: &Path, output: &Path, opts: &ModelfileOptions) -> Result<usize> {
    let read = read_jsonl::<TrainingExample>(input)?;
    let (text, count) = render(&read.records, opts);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(output, text).with_context(|| format!("Failed to write {}", output.display()))?;

    info!(output = %output.display(), messages = count, "Wrote Modelfile");
    Ok(count)
}

fn escape(content: &str) -> String {
    content.replace('"', "\\\"").replace(['\r', '\n'], " ")
}
