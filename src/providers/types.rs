// Generation request shared by all backends

use serde::{Deserialize, Serialize};

use crate::data::Turn;

/// A chat to continue. The backend produces the next assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub messages: Vec<Turn>,
    /// Model name (backend-specific; local backends ignore it)
    pub model: String,
}

impl GenerationRequest {
    pub fn new(messages: Vec<Turn>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
        }
    }
}
