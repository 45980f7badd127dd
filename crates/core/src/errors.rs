use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BotError {
    #[error("could not decode event payload: {0}")]
    Decode(String),
    #[error("fetch of {resource} failed: {reason}")]
    Fetch { resource: String, reason: String },
    #[error("{action} failed: {reason}")]
    Reply { action: String, reason: String },
}

impl BotError {
    pub fn fetch(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch { resource: resource.into(), reason: reason.to_string() }
    }

    pub fn reply(action: impl Into<String>, reason: impl ToString) -> Self {
        Self::Reply { action: action.into(), reason: reason.to_string() }
    }

    /// Short machine-friendly class used as a structured log field.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Fetch { .. } => "fetch",
            Self::Reply { .. } => "reply",
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
