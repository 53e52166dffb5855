// Resume support: find the newest `checkpoint-N` directory of a run

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::constants::CHECKPOINT_PREFIX;

/// Highest-numbered `checkpoint-N` directory directly under `output_dir`.
pub fn latest_checkpoint(output_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(output_dir).ok()?;

    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name();
            let step = name
                .to_str()?
                .strip_prefix(CHECKPOINT_PREFIX)?
                .parse::<u64>()
                .ok()?;
            Some((step, e.path()))
        })
        .max_by_key(|(step, _)| *step)
        .map(|(_, path)| path)
}
