// Chat templates for locally loaded models
//
// A fine-tuned model answers in the layout it was trained on, so the prompt
// must be rendered the same way the training turns were.

use crate::config::TemplateKind;
use crate::data::{Role, Turn};

impl TemplateKind {
    /// Render `turns` into a prompt ending where the assistant's reply begins.
    pub fn render(&self, turns: &[Turn]) -> String {
        match self {
            TemplateKind::Zephyr => render_zephyr(turns),
            TemplateKind::Llama3 => render_llama3(turns),
            TemplateKind::Instruction => render_instruction(turns),
        }
    }

    /// Special tokens that end the assistant's turn.
    pub fn stop_tokens(&self) -> &'static [&'static str] {
        match self {
            TemplateKind::Zephyr => &["</s>"],
            TemplateKind::Llama3 => &["<|eot_id|>", "<|end_of_text|>"],
            TemplateKind::Instruction => &["</s>"],
        }
    }

    /// Plain-text markers after which generated text is cut off.
    pub fn stop_sequences(&self) -> &'static [&'static str] {
        match self {
            TemplateKind::Zephyr => &["<|user|>"],
            TemplateKind::Llama3 => &[],
            TemplateKind::Instruction => &["### Instruction:"],
        }
    }

    /// Whether the tokenizer should add its own BOS token when encoding.
    pub fn add_special_tokens(&self) -> bool {
        !matches!(self, TemplateKind::Llama3)
    }
}

fn render_zephyr(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&format!("<|{}|>\n{}</s>\n", turn.role.as_str(), turn.content));
    }
    out.push_str("<|assistant|>\n");
    out
}

fn render_llama3(turns: &[Turn]) -> String {
    let mut out = String::from("<|begin_of_text|>");
    for turn in turns {
        out.push_str(&format!(
            "<|start_header_id|>{}<|end_header_id|>\n\n{}<|eot_id|>",
            turn.role.as_str(),
            turn.content
        ));
    }
    out.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    out
}

fn render_instruction(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        match turn.role {
            Role::System => {
                out.push_str(&turn.content);
                out.push_str("\n\n");
            }
            Role::User => out.push_str(&format!("### Instruction:\n{}\n\n", turn.content)),
            Role::Assistant => out.push_str(&format!("### Response:\n{}\n\n", turn.content)),
        }
    }
    out.push_str("### Response:\n");
    out
}
