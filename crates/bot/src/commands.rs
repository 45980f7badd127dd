use meetmatter_core::text::{mentions, strip_mentions_and_hashtags};

/// Emoji names the bot reacts with.
pub mod emoji {
    pub const PING: &str = "ping_pong";
    pub const TOPIC: &str = "pencil2";
    pub const TASK: &str = "memo";
    pub const COMPLETED: &str = "white_check_mark";
}

pub const TOPIC_MARKERS: [&str; 2] = ["#topic", "#agenda"];
pub const TASK_MARKERS: [&str; 2] = ["#todo", "#task"];

pub const HELP_TEXT: &str = include_str!("../HELP.md");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectCommand {
    Ping,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashtagMarker {
    Topic,
    Task,
}

impl HashtagMarker {
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Topic => emoji::TOPIC,
            Self::Task => emoji::TASK,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupCommand {
    ListTopics,
    CompleteAll,
}

pub fn parse_direct_command(body: &str) -> Option<DirectCommand> {
    match body {
        "ping" => Some(DirectCommand::Ping),
        "help" => Some(DirectCommand::Help),
        _ => None,
    }
}

/// Matches the server-extracted hashtag string exactly, so a post carrying
/// more than one hashtag is not a marker.
pub fn classify_hashtags(hashtags: &str) -> Option<HashtagMarker> {
    if is_topic_marker(hashtags) {
        Some(HashtagMarker::Topic)
    } else if TASK_MARKERS.contains(&hashtags) {
        Some(HashtagMarker::Task)
    } else {
        None
    }
}

pub fn is_topic_marker(hashtags: &str) -> bool {
    TOPIC_MARKERS.contains(&hashtags)
}

/// Group commands only count when the bot is mentioned.
pub fn parse_group_command(body: &str, bot_username: &str) -> Option<GroupCommand> {
    if !mentions(body, bot_username) {
        return None;
    }

    match strip_mentions_and_hashtags(body).as_str() {
        "list topics" => Some(GroupCommand::ListTopics),
        "complete all" => Some(GroupCommand::CompleteAll),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        classify_hashtags, parse_direct_command, parse_group_command, DirectCommand,
        GroupCommand, HashtagMarker, HELP_TEXT,
    };

    #[test]
    fn direct_commands_match_exactly() {
        assert_eq!(parse_direct_command("ping"), Some(DirectCommand::Ping));
        assert_eq!(parse_direct_command("help"), Some(DirectCommand::Help));
        assert_eq!(parse_direct_command("Ping"), None);
        assert_eq!(parse_direct_command(" ping"), None);
        assert_eq!(parse_direct_command("help me"), None);
    }

    #[test]
    fn hashtag_markers_cover_topic_agenda_todo_task() {
        assert_eq!(classify_hashtags("#topic"), Some(HashtagMarker::Topic));
        assert_eq!(classify_hashtags("#agenda"), Some(HashtagMarker::Topic));
        assert_eq!(classify_hashtags("#todo"), Some(HashtagMarker::Task));
        assert_eq!(classify_hashtags("#task"), Some(HashtagMarker::Task));
        assert_eq!(classify_hashtags("#topic #todo"), None);
        assert_eq!(classify_hashtags(""), None);
        assert_eq!(HashtagMarker::Topic.emoji(), "pencil2");
        assert_eq!(HashtagMarker::Task.emoji(), "memo");
    }

    #[test]
    fn group_commands_require_a_mention() {
        assert_eq!(
            parse_group_command("@meetbot list topics", "meetbot"),
            Some(GroupCommand::ListTopics)
        );
        assert_eq!(
            parse_group_command("complete all @meetbot", "meetbot"),
            Some(GroupCommand::CompleteAll)
        );
        assert_eq!(parse_group_command("list topics", "meetbot"), None);
        assert_eq!(parse_group_command("@someone list topics", "meetbot"), None);
        assert_eq!(parse_group_command("@meetbot list all topics", "meetbot"), None);
        assert_eq!(parse_group_command("@meetbot-staging complete all", "meetbot"), None);
    }

    #[test]
    fn help_text_documents_every_command() {
        let needles = ["ping", "help", "#topic", "#agenda", "#todo", "list topics", "complete all"];
        for needle in needles {
            assert!(HELP_TEXT.contains(needle), "help text should mention `{needle}`");
        }
    }
}
