// Export scraper
// Walks a chat export directory and produces cleaned, time-ordered records

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::jsonl::read_lines_with;
use super::record::{CleanedMessage, RawMessage, DEFAULT_CHANNEL};

const PREVIEW_CHARS: usize = 100;

/// Outcome of one scrape run.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    /// Cleaned messages, ascending by timestamp
    pub messages: Vec<CleanedMessage>,
    pub files: usize,
    /// Files that could not be read or parsed at all
    pub errors: usize,
    /// Records matching no known shape
    pub malformed: usize,
    /// Records whose content cleaned to nothing
    pub empty: usize,
}

impl ScrapeReport {
    /// `[timestamp] author: text` lines for the first `n` messages.
    pub fn sample(&self, n: usize) -> Vec<String> {
        self.messages
            .iter()
            .take(n)
            .map(|m| {
                let ts = if m.timestamp.is_empty() {
                    "no timestamp"
                } else {
                    m.timestamp.as_str()
                };
                format!("[{}] {}: {}", ts, m.author_name, preview(&m.text))
            })
            .collect()
    }
}

/// Scrape every `*.json` / `*.jsonl` file under `export_path`.
///
/// A `.json` file holds an array of message objects; a `.jsonl` file one object per
/// line. Records without a channel field take the name of their file's parent directory.
pub fn scrape(export_path: &Path, show_progress: bool) -> Result<ScrapeReport> {
    if !export_path.exists() {
        anyhow::bail!("Export path does not exist: {}", export_path.display());
    }

    let files = collect_files(export_path);
    debug!(count = files.len(), "Found export files");

    let pb = if show_progress {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("=>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut report = ScrapeReport::default();

    for path in &files {
        pb.inc(1);
        let channel = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => read_lines_with(path, |line| RawMessage::from_json_line(line, &channel))
                .map(|read| (read.records, read.malformed)),
            _ => read_array_file(path, &channel),
        };

        let (records, malformed) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                report.errors += 1;
                warn!(path = %path.display(), "Failed to process export file: {:#}", e);
                continue;
            }
        };

        report.files += 1;
        report.malformed += malformed;
        for raw in records {
            match CleanedMessage::from_raw(raw) {
                Some(msg) => report.messages.push(msg),
                None => report.empty += 1,
            }
        }
        pb.set_message(format!("{} messages", report.messages.len()));
    }

    pb.finish_and_clear();

    report
        .messages
        .sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(report)
}

fn collect_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("json" | "jsonl")))
        .collect()
}

/// Parse a whole-file JSON array. A file that is not an array yields no records.
fn read_array_file(path: &Path, channel: &str) -> Result<(Vec<RawMessage>, usize)> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let Value::Array(items) = value else {
        debug!(path = %path.display(), "Not a message array, skipping");
        return Ok((Vec::new(), 0));
    };

    let mut records = Vec::with_capacity(items.len());
    let mut malformed = 0;
    for item in &items {
        match RawMessage::from_value(item, channel) {
            Ok(raw) => records.push(raw),
            Err(e) => {
                malformed += 1;
                debug!(path = %path.display(), "Skipping record: {}", e);
            }
        }
    }
    Ok((records, malformed))
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn export_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let general = dir.path().join("general");
        fs::create_dir_all(&general).unwrap();
        fs::write(
            general.join("messages.json"),
            r#"[
                {"Contents": "second <@1>", "Timestamp": "2023-01-02", "AuthorID": 7, "AuthorName": "rohan"},
                {"Contents": "first", "Timestamp": "2023-01-01", "AuthorID": 8},
                {"Contents": "https://only.link", "Timestamp": "2023-01-03"},
                "not an object",
                {"Attachments": "x.png"}
            ]"#,
        )
        .unwrap();

        let random = dir.path().join("random");
        fs::create_dir_all(&random).unwrap();
        fs::write(
            random.join("log.jsonl"),
            "{\"content\":\"hey\",\"timestamp\":\"2023-01-05\",\"channel\":\"dm\"}\n{bad\n",
        )
        .unwrap();
        fs::write(random.join("broken.json"), "{ nope").unwrap();
        fs::write(random.join("notes.txt"), "ignored").unwrap();
        dir
    }

    #[test]
    fn test_scrape_export_tree() {
        let dir = export_dir();
        let report = scrape(dir.path(), false).unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.empty, 1);
        assert_eq!(report.malformed, 3);

        let texts: Vec<_> = report.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "hey"]);

        assert_eq!(report.messages[0].channel, "general");
        assert_eq!(report.messages[0].author_id, "8");
        assert_eq!(report.messages[0].author_name, "unknown");
        assert_eq!(report.messages[1].author_name, "rohan");
        assert_eq!(report.messages[2].channel, "dm");
        assert!(report.messages.iter().all(|m| m.source == "discord"));
    }

    #[test]
    fn test_missing_export_path() {
        let dir = TempDir::new().unwrap();
        assert!(scrape(&dir.path().join("absent"), false).is_err());
    }

    #[test]
    fn test_sample_truncates_long_text() {
        let long = "x".repeat(150);
        let report = ScrapeReport {
            messages: vec![CleanedMessage {
                text: long,
                timestamp: String::new(),
                author_id: String::new(),
                author_name: "unknown".to_string(),
                channel: "c".to_string(),
                source: "discord".to_string(),
            }],
            ..Default::default()
        };
        let lines = report.sample(5);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[no timestamp] unknown: "));
        assert!(lines[0].ends_with("..."));
        assert_eq!(lines[0].len(), "[no timestamp] unknown: ".len() + 103);
    }
}
