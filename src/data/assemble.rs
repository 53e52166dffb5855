// Conversation assembler
//
// Groups messages by channel, orders each group by timestamp and pairs adjacent
// records into (prompt, response) training examples.

use std::collections::BTreeMap;

use super::example::{ExampleFormat, TrainingExample, Turn};
use super::record::RawMessage;

/// Per-run pairing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub channels: usize,
    pub messages: usize,
    /// Pairs dropped because one side cleaned to nothing
    pub skipped_pairs: usize,
    /// Trailing messages left without a response
    pub dangling: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub examples: Vec<TrainingExample>,
    pub stats: AssemblyStats,
}

/// Builds training examples from loaded messages.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    system_prompt: Option<String>,
    format: ExampleFormat,
}

impl Assembler {
    pub fn new(system_prompt: Option<String>, format: ExampleFormat) -> Self {
        // A blank prompt behaves like no prompt
        let system_prompt = system_prompt.filter(|p| !p.trim().is_empty());
        Self {
            system_prompt,
            format,
        }
    }

    /// Pair messages channel by channel.
    ///
    /// Within a channel records are sorted ascending by their timestamp string
    /// (stable, so ties keep input order) and taken two at a time. Records with no
    /// timestamp sort first. Output is grouped by channel name in lexical order.
    pub fn assemble(&self, messages: &[RawMessage]) -> Assembly {
        let mut channels: BTreeMap<&str, Vec<&RawMessage>> = BTreeMap::new();
        for msg in messages {
            channels.entry(msg.channel.as_str()).or_default().push(msg);
        }

        let mut assembly = Assembly {
            examples: Vec::new(),
            stats: AssemblyStats {
                channels: channels.len(),
                messages: messages.len(),
                ..Default::default()
            },
        };

        for (_, mut group) in channels {
            group.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

            let pairs = group.chunks_exact(2);
            assembly.stats.dangling += pairs.remainder().len();

            for pair in pairs {
                let prompt = pair[0].cleaned_text();
                let response = pair[1].cleaned_text();
                if prompt.is_empty() || response.is_empty() {
                    assembly.stats.skipped_pairs += 1;
                    continue;
                }
                assembly.examples.push(self.example(prompt, response));
            }
        }

        assembly
    }

    fn example(&self, prompt: String, response: String) -> TrainingExample {
        match self.format {
            ExampleFormat::Chat => {
                let mut messages = Vec::with_capacity(3);
                if let Some(system) = &self.system_prompt {
                    messages.push(Turn::system(system.clone()));
                }
                messages.push(Turn::user(prompt));
                messages.push(Turn::assistant(response));
                TrainingExample::Chat { messages }
            }
            ExampleFormat::Instruction => TrainingExample::Instruction {
                instruction: prompt,
                input: self.system_prompt.clone().unwrap_or_default(),
                output: response,
            },
        }
    }
}

/// Convenience wrapper: chat-format assembly with an optional system prompt.
pub fn assemble(messages: &[RawMessage], system_prompt: Option<&str>) -> Vec<TrainingExample> {
    Assembler::new(system_prompt.map(str::to_string), ExampleFormat::Chat)
        .assemble(messages)
        .examples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::DEFAULT_CHANNEL;
    use serde_json::json;

    fn msg(text: &str, timestamp: &str, channel: &str) -> RawMessage {
        RawMessage::from_value(
            &json!({"text": text, "timestamp": timestamp, "channel": channel}),
            DEFAULT_CHANNEL,
        )
        .unwrap()
    }

    #[test]
    fn test_single_pair_without_system_prompt() {
        let input = vec![msg("hi", "1", "a"), msg("hello!", "2", "a")];
        let examples = assemble(&input, None);

        assert_eq!(examples.len(), 1);
        assert_eq!(
            serde_json::to_string(&examples[0]).unwrap(),
            r#"{"messages":[{"role":"user","content":"hi"},{"role":"assistant","content":"hello!"}]}"#
        );
    }

    #[test]
    fn test_dangling_message_yields_nothing() {
        let input = vec![msg("alone", "1", "solo")];
        let assembly = Assembler::default().assemble(&input);
        assert!(assembly.examples.is_empty());
        assert_eq!(assembly.stats.dangling, 1);
    }

    #[test]
    fn test_odd_count_drops_trailing_message() {
        let input = vec![msg("a", "1", "c"), msg("b", "2", "c"), msg("c", "3", "c")];
        let examples = assemble(&input, None);
        assert_eq!(examples.len(), 1);
    }

    #[test]
    fn test_sorted_by_timestamp_before_pairing() {
        let input = vec![msg("second", "2", "a"), msg("first", "1", "a")];
        let examples = assemble(&input, None);
        let turns = examples[0].to_turns();
        assert_eq!(turns[0].content, "first");
        assert_eq!(turns[1].content, "second");
    }

    #[test]
    fn test_missing_timestamp_sorts_first() {
        let input = vec![msg("late", "5", "a"), msg("undated", "", "a")];
        let turns = assemble(&input, None)[0].to_turns();
        assert_eq!(turns[0].content, "undated");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let input = vec![
            msg("x1", "7", "a"),
            msg("x2", "7", "a"),
            msg("x3", "7", "a"),
            msg("x4", "7", "a"),
        ];
        let examples = assemble(&input, None);
        assert_eq!(examples[0].to_turns()[0].content, "x1");
        assert_eq!(examples[1].to_turns()[1].content, "x4");
    }

    #[test]
    fn test_channels_are_not_mixed() {
        let input = vec![msg("a1", "1", "a"), msg("b1", "2", "b")];
        let assembly = Assembler::default().assemble(&input);
        assert!(assembly.examples.is_empty());
        assert_eq!(assembly.stats.channels, 2);
        assert_eq!(assembly.stats.dangling, 2);
    }

    #[test]
    fn test_pair_with_empty_side_is_skipped_not_shifted() {
        // "<@1>" cleans to nothing; the pair is dropped and pairing does not realign
        let input = vec![
            msg("q1", "1", "a"),
            msg("<@1>", "2", "a"),
            msg("q2", "3", "a"),
            msg("r2", "4", "a"),
        ];
        let assembly = Assembler::default().assemble(&input);
        assert_eq!(assembly.examples.len(), 1);
        assert_eq!(assembly.stats.skipped_pairs, 1);
        assert_eq!(assembly.examples[0].to_turns()[0].content, "q2");
    }

    #[test]
    fn test_system_prompt_prefixes_every_example() {
        let input = vec![
            msg("a", "1", "x"),
            msg("b", "2", "x"),
            msg("c", "1", "y"),
            msg("d", "2", "y"),
        ];
        let examples = assemble(&input, Some("You are Rohan."));
        assert_eq!(examples.len(), 2);
        for example in &examples {
            let turns = example.to_turns();
            assert_eq!(turns[0], Turn::system("You are Rohan."));
            assert_eq!(turns.len(), 3);
        }
    }

    #[test]
    fn test_blank_system_prompt_is_ignored() {
        let input = vec![msg("a", "1", "x"), msg("b", "2", "x")];
        let examples = assemble(&input, Some("   "));
        assert_eq!(examples[0].to_turns().len(), 2);
    }

    #[test]
    fn test_instruction_format() {
        let input = vec![msg("q", "1", "x"), msg("a", "2", "x")];
        let assembler = Assembler::new(Some("sys".to_string()), ExampleFormat::Instruction);
        let examples = assembler.assemble(&input).examples;
        assert_eq!(
            examples[0],
            TrainingExample::Instruction {
                instruction: "q".to_string(),
                input: "sys".to_string(),
                output: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_pair_count_bound() {
        // n messages -> floor(n/2) pairs minus pairs with an empty side
        for n in 0..9 {
            let input: Vec<RawMessage> = (0..n)
                .map(|i| {
                    let text = if i % 3 == 2 { "https://only.link" } else { "text" };
                    msg(text, &format!("{i:03}"), "c")
                })
                .collect();

            let assembly = Assembler::default().assemble(&input);
            let expected_skipped = (0..n / 2)
                .filter(|p| [2 * p, 2 * p + 1].iter().any(|i| i % 3 == 2))
                .count();

            assert!(assembly.examples.len() <= n / 2);
            assert_eq!(assembly.examples.len(), n / 2 - expected_skipped);
            assert_eq!(assembly.stats.skipped_pairs, expected_skipped);
        }
    }

    #[test]
    fn test_deterministic_output() {
        let input = vec![
            msg("b2", "2", "b"),
            msg("a1", "1", "a"),
            msg("b1", "1", "b"),
            msg("a2", "2", "a"),
        ];
        let first = serde_json::to_string(&assemble(&input, Some("s"))).unwrap();
        let second = serde_json::to_string(&assemble(&input, Some("s"))).unwrap();
        assert_eq!(first, second);
    }
}
