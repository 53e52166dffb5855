// Dataset combiner: concatenate, shuffle, cap

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::example::TrainingExample;
use super::jsonl::read_jsonl_if_exists;

/// Where the records of a combine run came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub path: PathBuf,
    pub records: usize,
    pub malformed: usize,
    pub missing: bool,
}

impl SourceReport {
    fn skipped(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            records: 0,
            malformed: 0,
            missing: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Combined {
    pub examples: Vec<TrainingExample>,
    pub sources: Vec<SourceReport>,
    /// Records available before the cap was applied
    pub total: usize,
}

/// Merge the datasets at `sources`, shuffle the concatenation and keep at most `cap` records.
///
/// A missing or unreadable source contributes zero records and is only logged. Malformed lines
/// are skipped and counted. Duplicates across sources are kept. Pass `seed` for a
/// reproducible shuffle.
pub fn combine<P: AsRef<Path>>(sources: &[P], cap: usize, seed: Option<u64>) -> Result<Combined> {
    let mut combined = Combined::default();

    for source in sources {
        let path = source.as_ref();
        let report = match read_jsonl_if_exists::<TrainingExample>(path) {
            Ok(Some(read)) => {
                info!(path = %path.display(), records = read.records.len(), "Loaded dataset");
                let report = SourceReport {
                    path: path.to_path_buf(),
                    records: read.records.len(),
                    malformed: read.malformed,
                    missing: false,
                };
                combined.examples.extend(read.records);
                report
            }
            Ok(None) => {
                warn!(path = %path.display(), "Dataset not found, contributing zero records");
                SourceReport::skipped(path)
            }
            Err(e) => {
                warn!(path = %path.display(), "Dataset unreadable, contributing zero records: {:#}", e);
                SourceReport::skipped(path)
            }
        };
        combined.sources.push(report);
    }

    combined.total = combined.examples.len();

    // Shuffle the whole concatenation so the cap samples every source evenly
    match seed {
        Some(seed) => combined.examples.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => combined.examples.shuffle(&mut rand::thread_rng()),
    }
    combined.examples.truncate(cap);

    info!(
        total = combined.total,
        kept = combined.examples.len(),
        cap,
        "Combined datasets"
    );
    Ok(combined)
}
