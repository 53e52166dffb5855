// Chat export records
//
// Exports drifted over time (`Contents` vs `content` vs `text`, `AuthorID` vs
// `author_id`, ...). Every known variant is mapped onto one canonical shape here,
// so the rest of the pipeline never looks at raw JSON keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::clean::clean;

/// Keys that may carry the message body, most specific first.
const CONTENT_KEYS: &[&str] = &["Contents", "content", "text"];
const TIMESTAMP_KEYS: &[&str] = &["Timestamp", "timestamp"];
const AUTHOR_ID_KEYS: &[&str] = &["AuthorID", "author_id"];
const AUTHOR_NAME_KEYS: &[&str] = &["AuthorName", "author_name"];
const CHANNEL_KEYS: &[&str] = &["channel", "ChannelID", "channel_id"];
const SOURCE_KEYS: &[&str] = &["source"];

pub const UNKNOWN_AUTHOR: &str = "unknown";
pub const DEFAULT_CHANNEL: &str = "default";
pub const DEFAULT_SOURCE: &str = "discord";

/// Why a single record could not be mapped onto [`RawMessage`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has none of the known content fields (keys: {keys})")]
    UnknownShape { keys: String },
}

/// One exported chat record, as read. Content is not cleaned yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub content: String,
    pub timestamp: String,
    pub author_id: String,
    pub author_name: String,
    pub channel: String,
    pub source: String,
}

impl RawMessage {
    /// Parse one JSON line.
    pub fn from_json_line(line: &str, fallback_channel: &str) -> Result<Self, RecordError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| RecordError::InvalidJson(e.to_string()))?;
        Self::from_value(&value, fallback_channel)
    }

    /// Map a JSON value onto the canonical shape.
    ///
    /// `fallback_channel` is used when the record names no channel itself
    /// (directory exports encode the channel in the folder name).
    pub fn from_value(value: &Value, fallback_channel: &str) -> Result<Self, RecordError> {
        let map = value.as_object().ok_or(RecordError::NotAnObject)?;

        if !CONTENT_KEYS.iter().any(|k| map.contains_key(*k)) {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            return Err(RecordError::UnknownShape {
                keys: keys.join(", "),
            });
        }

        Ok(Self {
            content: first_string(map, CONTENT_KEYS).unwrap_or_default(),
            timestamp: first_scalar(map, TIMESTAMP_KEYS).unwrap_or_default(),
            author_id: first_scalar(map, AUTHOR_ID_KEYS).unwrap_or_default(),
            author_name: first_scalar(map, AUTHOR_NAME_KEYS)
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            channel: first_scalar(map, CHANNEL_KEYS).unwrap_or_else(|| fallback_channel.to_string()),
            source: first_scalar(map, SOURCE_KEYS).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        })
    }

    /// Cleaned text of this record (may be empty).
    pub fn cleaned_text(&self) -> String {
        clean(&self.content)
    }
}

/// A record whose content survived cleaning. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedMessage {
    pub text: String,
    pub timestamp: String,
    pub author_id: String,
    pub author_name: String,
    pub channel: String,
    pub source: String,
}

impl CleanedMessage {
    /// Clean a raw record; `None` when nothing is left of its content.
    pub fn from_raw(raw: RawMessage) -> Option<Self> {
        let text = clean(&raw.content);
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text,
            timestamp: raw.timestamp,
            author_id: raw.author_id,
            author_name: raw.author_name,
            channel: raw.channel,
            source: raw.source,
        })
    }
}

/// First non-empty string among `keys`. Non-string values do not count as content.
fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

/// First non-empty scalar among `keys`, stringified (ids and epoch timestamps are often numbers).
fn first_scalar(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discord_export_variant() {
        let value = json!({
            "Contents": "hello <@123>",
            "Timestamp": "2023-01-01 10:00:00",
            "AuthorID": 987654321,
            "AuthorName": "rohan"
        });
        let msg = RawMessage::from_value(&value, "general").unwrap();
        assert_eq!(msg.content, "hello <@123>");
        assert_eq!(msg.timestamp, "2023-01-01 10:00:00");
        assert_eq!(msg.author_id, "987654321");
        assert_eq!(msg.author_name, "rohan");
        assert_eq!(msg.channel, "general");
        assert_eq!(msg.source, "discord");
        assert_eq!(msg.cleaned_text(), "hello");
    }

    #[test]
    fn test_processed_variant() {
        let value = json!({"text": "hi", "timestamp": "1", "channel": "a"});
        let msg = RawMessage::from_value(&value, DEFAULT_CHANNEL).unwrap();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.channel, "a");
        assert_eq!(msg.author_name, UNKNOWN_AUTHOR);
        assert_eq!(msg.author_id, "");
    }

    #[test]
    fn test_empty_primary_key_falls_through() {
        let value = json!({"Contents": "", "content": "fallback"});
        let msg = RawMessage::from_value(&value, DEFAULT_CHANNEL).unwrap();
        assert_eq!(msg.content, "fallback");
    }

    #[test]
    fn test_non_string_content_is_empty() {
        let value = json!({"content": 12});
        let msg = RawMessage::from_value(&value, DEFAULT_CHANNEL).unwrap();
        assert_eq!(msg.content, "");
        assert!(CleanedMessage::from_raw(msg).is_none());
    }

    #[test]
    fn test_unknown_shape_is_reported() {
        let value = json!({"body": "x", "when": "1"});
        let err = RawMessage::from_value(&value, DEFAULT_CHANNEL).unwrap_err();
        assert_eq!(
            err,
            RecordError::UnknownShape {
                keys: "body, when".to_string()
            }
        );
    }

    #[test]
    fn test_not_an_object() {
        assert_eq!(
            RawMessage::from_value(&json!(["a"]), DEFAULT_CHANNEL).unwrap_err(),
            RecordError::NotAnObject
        );
    }

    #[test]
    fn test_invalid_json_line() {
        let err = RawMessage::from_json_line("{not json", DEFAULT_CHANNEL).unwrap_err();
        assert!(matches!(err, RecordError::InvalidJson(_)));
    }

    #[test]
    fn test_cleaned_message_keeps_metadata() {
        let raw = RawMessage::from_value(
            &json!({"content": "  yo   https://x.y  ", "timestamp": "5", "channel": "c"}),
            DEFAULT_CHANNEL,
        )
        .unwrap();
        let cleaned = CleanedMessage::from_raw(raw).unwrap();
        assert_eq!(cleaned.text, "yo");
        assert_eq!(cleaned.timestamp, "5");
        assert_eq!(cleaned.channel, "c");
    }
}
