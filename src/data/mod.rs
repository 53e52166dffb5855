// Dataset pipeline
//
// Raw chat exports -> cleaned records -> paired conversations -> combined
// datasets. Each stage reads complete files and writes complete files.

pub mod assemble;
pub mod clean;
pub mod combine;
pub mod example;
pub mod jsonl;
pub mod loader;
pub mod modelfile;
pub mod record;
pub mod scrape;

pub use assemble::{assemble, Assembler, Assembly, AssemblyStats};
pub use clean::clean;
pub use combine::{combine, Combined, SourceReport};
pub use example::{ExampleFormat, Role, TrainingExample, Turn};
pub use jsonl::{read_jsonl, write_jsonl, JsonlRead};
pub use loader::load;
pub use modelfile::ModelfileOptions;
pub use record::{CleanedMessage, RawMessage, RecordError};
pub use scrape::{scrape, ScrapeReport};

use anyhow::Result;
use std::path::Path;
use tracing::info;

/// Settings for turning a message file into a dataset.
#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub system_prompt: Option<String>,
    pub format: ExampleFormat,
    /// Keep only the first N examples; `None` keeps all
    pub max_examples: Option<usize>,
}

/// What `prepare` read and wrote.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareSummary {
    pub messages: usize,
    pub malformed: usize,
    pub examples: usize,
    pub stats: AssemblyStats,
}

/// Load messages from `input`, assemble them and write the dataset to `output`.
pub fn prepare(input: &Path, output: &Path, opts: &PrepareOptions) -> Result<PrepareSummary> {
    let loaded = load(input)?;
    info!(
        path = %input.display(),
        messages = loaded.records.len(),
        malformed = loaded.malformed,
        "Loaded messages"
    );

    let assembler = Assembler::new(opts.system_prompt.clone(), opts.format);
    let mut assembly = assembler.assemble(&loaded.records);
    if let Some(cap) = opts.max_examples {
        assembly.examples.truncate(cap);
    }

    write_jsonl(output, &assembly.examples)?;
    info!(
        path = %output.display(),
        examples = assembly.examples.len(),
        "Wrote training examples"
    );

    Ok(PrepareSummary {
        messages: loaded.records.len(),
        malformed: loaded.malformed,
        examples: assembly.examples.len(),
        stats: assembly.stats,
    })
}
