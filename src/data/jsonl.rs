// Line-delimited JSON I/O
//
// Readers skip blank lines and count (rather than fail on) malformed ones.
// Writers emit one compact object per line with a trailing newline.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Records read from one file plus how many lines were rejected.
#[derive(Debug)]
pub struct JsonlRead<T> {
    pub records: Vec<T>,
    pub malformed: usize,
}

impl<T> Default for JsonlRead<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            malformed: 0,
        }
    }
}

/// Read every non-blank line of `path`, mapping each through `parse`.
///
/// A line that is not UTF-8 or that `parse` rejects is logged and counted; the
/// rest of the file is still read. Failing to open or read the file itself is an error.
pub fn read_lines_with<T, E, F>(path: &Path, mut parse: F) -> Result<JsonlRead<T>>
where
    E: std::fmt::Display,
    F: FnMut(&str) -> std::result::Result<T, E>,
{
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut out = JsonlRead::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read line {} of {}", line_no + 1, path.display()))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                out.malformed += 1;
                warn!(path = %path.display(), line = line_no, "Skipping non-UTF-8 line: {}", e);
                continue;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse(trimmed) {
            Ok(record) => out.records.push(record),
            Err(e) => {
                out.malformed += 1;
                warn!(path = %path.display(), line = line_no, "Skipping malformed record: {}", e);
            }
        }
    }

    debug!(
        path = %path.display(),
        records = out.records.len(),
        malformed = out.malformed,
        "Read JSONL file"
    );
    Ok(out)
}

/// Deserialize every non-blank line of `path` as `T`.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<JsonlRead<T>> {
    read_lines_with(path, |line| serde_json::from_str::<T>(line))
}

/// Like [`read_jsonl`] but a path that is not a regular file yields `None` instead of an error.
pub fn read_jsonl_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<JsonlRead<T>>> {
    if !path.is_file() {
        return Ok(None);
    }
    read_jsonl(path).map(Some)
}

/// Write `records` to `path`, one JSON object per line, replacing any existing file.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        writeln!(writer, "{}", json)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}
