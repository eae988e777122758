//! Keyword lookup for spoken camera commands.
//!
//! Recognised speech is matched by case-insensitive substring against a
//! short keyword list per command. The first command with a matching keyword
//! wins, in declaration order.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// End the camera session.
    Close,
    TextMode,
    ObjectMode,
    /// Re-announce the current detection.
    Repeat,
    /// Replay the hazard burst.
    Hazard,
}

const COMMAND_KEYWORDS: &[(Command, &[&str])] = &[
    (Command::Close, &["back", "stop", "close", "exit"]),
    (Command::TextMode, &["text", "read"]),
    (Command::ObjectMode, &["object", "scan"]),
    (Command::Repeat, &["what", "repeat", "again"]),
    (Command::Hazard, &["hazard", "danger"]),
];

pub fn parse_command(phrase: &str) -> Option<Command> {
    let phrase = phrase.to_lowercase();
    COMMAND_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| phrase.contains(k)))
        .map(|(command, _)| *command)
}
