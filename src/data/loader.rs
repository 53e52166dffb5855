// Message loader: newline-delimited export records -> RawMessage

use anyhow::Result;
use std::path::Path;

use super::jsonl::{read_lines_with, JsonlRead};
use super::record::{RawMessage, DEFAULT_CHANNEL};

/// Load every record of a JSONL export file.
///
/// Malformed lines and lines matching no known record shape are counted in
/// `malformed` and skipped. Missing keys are defaulted.
pub fn load(path: &Path) -> Result<JsonlRead<RawMessage>> {
    read_lines_with(path, |line| RawMessage::from_json_line(line, DEFAULT_CHANNEL))
}
