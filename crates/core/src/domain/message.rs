use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Emoji-name fragment that marks a topic as done.
pub const COMPLETION_MARKER: &str = "check";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "WireReaction")]
pub struct Reaction {
    pub author_id: String,
    pub emoji_name: String,
}

impl Reaction {
    pub fn new(author_id: impl Into<String>, emoji_name: impl Into<String>) -> Self {
        Self { author_id: author_id.into(), emoji_name: emoji_name.into() }
    }

    pub fn is_completion_marker(&self) -> bool {
        self.emoji_name.contains(COMPLETION_MARKER)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "WirePost")]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub root_id: String,
    pub body: String,
    /// Space separated hashtags as extracted by the server, e.g. `#topic`.
    pub hashtags: String,
    pub created_at: DateTime<Utc>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn is_completed(&self) -> bool {
        self.reactions.iter().any(Reaction::is_completion_marker)
    }
}

#[derive(Deserialize)]
struct WireReaction {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    emoji_name: String,
}

impl From<WireReaction> for Reaction {
    fn from(wire: WireReaction) -> Self {
        Self { author_id: wire.user_id, emoji_name: wire.emoji_name }
    }
}

#[derive(Deserialize)]
struct WirePost {
    id: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    root_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    hashtags: String,
    #[serde(default)]
    create_at: i64,
    #[serde(default)]
    metadata: Option<WireMetadata>,
}

#[derive(Deserialize)]
struct WireMetadata {
    #[serde(default)]
    reactions: Option<Vec<WireReaction>>,
}

impl From<WirePost> for Message {
    fn from(wire: WirePost) -> Self {
        let reactions = wire
            .metadata
            .and_then(|metadata| metadata.reactions)
            .unwrap_or_default()
            .into_iter()
            .map(Reaction::from)
            .collect();

        Self {
            id: wire.id,
            channel_id: wire.channel_id,
            author_id: wire.user_id,
            root_id: wire.root_id,
            body: wire.message,
            hashtags: wire.hashtags,
            created_at: DateTime::from_timestamp_millis(wire.create_at).unwrap_or_default(),
            reactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, Reaction};

    #[test]
    fn decodes_post_with_reactions() {
        let message: Message = serde_json::from_str(
            r##"{
                "id": "p1",
                "create_at": 1700000000000,
                "channel_id": "c1",
                "user_id": "u1",
                "root_id": "",
                "message": "Plan release #topic",
                "hashtags": "#topic",
                "metadata": {
                    "reactions": [
                        {"user_id": "u2", "post_id": "p1", "emoji_name": "white_check_mark"}
                    ]
                }
            }"##,
        )
        .expect("post json");

        assert_eq!(message.author_id, "u1");
        assert_eq!(message.body, "Plan release #topic");
        assert_eq!(message.hashtags, "#topic");
        assert_eq!(message.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(message.reactions, vec![Reaction::new("u2", "white_check_mark")]);
        assert!(message.is_completed());
    }

    #[test]
    fn tolerates_missing_or_null_metadata() {
        let bare: Message =
            serde_json::from_str(r#"{"id":"p2","message":"hi"}"#).expect("post json");
        assert!(bare.reactions.is_empty());

        let null_reactions: Message =
            serde_json::from_str(r#"{"id":"p3","message":"hi","metadata":{"reactions":null}}"#)
                .expect("post json");
        assert!(null_reactions.reactions.is_empty());
        assert!(!null_reactions.is_completed());
    }

    #[test]
    fn completion_marker_is_a_case_sensitive_substring() {
        assert!(Reaction::new("u", "heavy_check_mark").is_completion_marker());
        assert!(Reaction::new("u", "ballot_box_with_check").is_completion_marker());
        assert!(!Reaction::new("u", "CHECK").is_completion_marker());
        assert!(!Reaction::new("u", "thumbsup").is_completion_marker());
    }
}
