// Chat endpoint request/response types

use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::data::Turn;

/// Body of `POST /api/chat`.
///
/// Either `content` (a single user message) or `messages` (a conversation) must
/// carry text. When both are given, `content` is appended as the final user turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Turn>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Turns to send to the backend; blank turns are dropped.
    pub fn turns(&self) -> Result<Vec<Turn>, ApiError> {
        let mut turns: Vec<Turn> = self
            .messages
            .iter()
            .flatten()
            .filter(|t| !t.content.trim().is_empty())
            .cloned()
            .collect();

        if let Some(content) = self.content.as_deref().map(str::trim) {
            if !content.is_empty() {
                turns.push(Turn::user(content));
            }
        }

        if turns.is_empty() {
            return Err(ApiError::BadRequest(
                "No content provided in the request".to_string(),
            ));
        }
        Ok(turns)
    }

    /// Requested model, if it names one.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// Non-streaming reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Role;

    fn parse(json: &str) -> ChatRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_content_only() {
        let turns = parse(r#"{"content": "  hey  "}"#).turns().unwrap();
        assert_eq!(turns, vec![Turn::user("hey")]);
    }

    #[test]
    fn test_messages_with_blank_entries() {
        let req = parse(
            r#"{"messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "   "},
                {"role": "user", "content": "sup"}
            ]}"#,
        );
        let turns = req.turns().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[1].content, "sup");
    }

    #[test]
    fn test_content_appended_to_messages() {
        let req = parse(
            r#"{"messages": [{"role": "assistant", "content": "yo"}], "content": "next"}"#,
        );
        let turns = req.turns().unwrap();
        assert_eq!(turns.last().unwrap(), &Turn::user("next"));
    }

    #[test]
    fn test_unusable_requests() {
        for body in [
            "{}",
            r#"{"content": ""}"#,
            r#"{"content": "   \n"}"#,
            r#"{"messages": []}"#,
            r#"{"messages": [{"role": "user", "content": " "}]}"#,
            r#"{"content": null, "model": "x"}"#,
        ] {
            assert!(
                matches!(parse(body).turns(), Err(ApiError::BadRequest(_))),
                "{body} should be rejected"
            );
        }
    }

    #[test]
    fn test_model_blank_is_none() {
        assert_eq!(parse(r#"{"model": " "}"#).model(), None);
        assert_eq!(parse(r#"{"model": "rohan"}"#).model(), Some("rohan"));
    }
}
