// Training example shapes accepted by fine-tuning frameworks

use serde::{Deserialize, Serialize};

/// Speaker of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One `{role, content}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A record ready for a fine-tuning framework. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainingExample {
    /// `{"messages": [{"role", "content"}, ...]}`
    Chat { messages: Vec<Turn> },
    /// `{"instruction", "input", "output"}`
    Instruction {
        instruction: String,
        #[serde(default)]
        input: String,
        output: String,
    },
}

impl TrainingExample {
    /// The example as chat turns; instruction records become user/assistant pairs.
    pub fn to_turns(&self) -> Vec<Turn> {
        match self {
            TrainingExample::Chat { messages } => messages.clone(),
            TrainingExample::Instruction {
                instruction,
                input,
                output,
            } => {
                let mut turns = Vec::with_capacity(3);
                if !input.is_empty() {
                    turns.push(Turn::system(input.clone()));
                }
                turns.push(Turn::user(instruction.clone()));
                turns.push(Turn::assistant(output.clone()));
                turns
            }
        }
    }
}

/// Output shape for assembled datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExampleFormat {
    /// `{"messages": [...]}`
    #[default]
    Chat,
    /// `{"instruction", "input", "output"}`
    Instruction,
}
