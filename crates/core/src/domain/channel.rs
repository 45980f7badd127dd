use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Direct,
    Group,
    Other,
}

impl ChannelKind {
    /// Maps Mattermost channel type codes (`D`, `G`, `O`, `P`).
    pub fn from_type_code(code: &str) -> Self {
        match code {
            "D" => Self::Direct,
            "G" => Self::Group,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "WireChannel")]
pub struct Channel {
    pub id: String,
    pub kind: ChannelKind,
    pub display_name: String,
}

impl Channel {
    /// Placeholder cached when a lookup fails under the fallback policy.
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ChannelKind::Other, display_name: String::new() }
    }
}

#[derive(Deserialize)]
struct WireChannel {
    id: String,
    #[serde(rename = "type", default)]
    type_code: String,
    #[serde(default)]
    display_name: String,
}

impl From<WireChannel> for Channel {
    fn from(wire: WireChannel) -> Self {
        Self {
            id: wire.id,
            kind: ChannelKind::from_type_code(&wire.type_code),
            display_name: wire.display_name,
        }
    }
}
