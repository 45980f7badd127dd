//! Normalization of message bodies.
//!
//! Mattermost keeps mentions and hashtags inline in the message text, so the
//! routing tokens have to be stripped before the remaining words can be
//! compared against a command or echoed back to users.

use std::sync::OnceLock;

use regex::Regex;

static MENTION_OR_HASHTAG: OnceLock<Regex> = OnceLock::new();
static HASHTAG: OnceLock<Regex> = OnceLock::new();

fn mention_or_hashtag() -> &'static Regex {
    MENTION_OR_HASHTAG.get_or_init(|| Regex::new(r"[@#]\S+").expect("static pattern"))
}

fn hashtag() -> &'static Regex {
    HASHTAG.get_or_init(|| Regex::new(r"#\S+").expect("static pattern"))
}

/// Removes every `@mention` and `#hashtag` token, then trims.
pub fn strip_mentions_and_hashtags(text: &str) -> String {
    mention_or_hashtag().replace_all(text, "").trim().to_owned()
}

/// Removes `#hashtag` tokens only, keeping mentions, then trims.
pub fn strip_hashtags(text: &str) -> String {
    hashtag().replace_all(text, "").trim().to_owned()
}

/// True when `text` contains `@username` as a whole handle, so `@meetbot`
/// does not match inside `@meetbot-staging`.
pub fn mentions(text: &str, username: &str) -> bool {
    if username.is_empty() {
        return false;
    }

    let handle = format!("@{username}");
    text.match_indices(&handle).any(|(start, _)| {
        text[start + handle.len()..].chars().next().map_or(true, |next| !is_handle_char(next))
    })
}

fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}
