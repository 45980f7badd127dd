use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "WireUser")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

impl User {
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self { id: id.into(), username: String::new(), display_name: String::new() }
    }
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

impl From<WireUser> for User {
    fn from(wire: WireUser) -> Self {
        let full_name = format!("{} {}", wire.first_name.trim(), wire.last_name.trim());
        let display_name = if !wire.nickname.trim().is_empty() {
            wire.nickname.trim().to_owned()
        } else if !full_name.trim().is_empty() {
            full_name.trim().to_owned()
        } else {
            wire.username.clone()
        };

        Self { id: wire.id, username: wire.username, display_name }
    }
}
