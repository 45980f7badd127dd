//! Meeting bot behavior on top of the Mattermost client.
//!
//! - `commands` - classification of direct commands, hashtag markers and group commands
//! - `cache` - per-session user and channel lookups
//! - `topics` - open topic collection over channel history
//! - `dispatcher` - the `posted` event handler tying it together

pub mod cache;
pub mod commands;
pub mod dispatcher;
pub mod topics;

pub use cache::EntityCache;
pub use dispatcher::CommandDispatcher;
pub use topics::TopicCollector;
