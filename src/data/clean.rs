// Message cleaner
// Strips Discord markup (mentions, custom emoji, links) from exported text

use once_cell::sync::Lazy;
use regex::Regex;

static USER_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<@!?\d+>").unwrap());
static CHANNEL_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#\d+>").unwrap());
static CUSTOM_EMOJI: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a?:\w+:\d+>").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

/// Remove mention/emoji/URL markup, collapse whitespace runs and trim.
///
/// Removal is repeated until nothing matches, so markup that only forms once an
/// inner token is cut out (`<@<@1>2>`) is removed as well.
pub fn clean(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let stripped = strip_markup(&current);
        if stripped == current {
            break;
        }
        current = stripped;
    }

    current.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_markup(text: &str) -> String {
    let text = USER_MENTION.replace_all(text, "");
    let text = CHANNEL_MENTION.replace_all(&text, "");
    let text = CUSTOM_EMOJI.replace_all(&text, "");
    URL.replace_all(&text, "").into_owned()
}

/// True when `text` still carries any markup `clean` removes.
pub fn has_markup(text: &str) -> bool {
    USER_MENTION.is_match(text)
        || CHANNEL_MENTION.is_match(text)
        || CUSTOM_EMOJI.is_match(text)
        || URL.is_match(text)
}
