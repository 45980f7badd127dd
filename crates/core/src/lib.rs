//! Domain types, message normalization, configuration and error kinds
//! shared by the meetmatter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod text;

pub use config::{AppConfig, CacheFailurePolicy, ConfigError, LoadOptions};
pub use domain::channel::{Channel, ChannelKind};
pub use domain::message::{Message, Reaction};
pub use domain::user::User;
pub use errors::BotError;
