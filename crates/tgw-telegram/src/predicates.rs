//! Pure update classifiers. All of them are cheap, side-effect free and safe
//! to share across concurrently dispatched updates.

use regex::Regex;
use teloxide::types::{Update, UpdateKind};

use crate::extract::{message_of, searchable_text};

const COMMAND_MARKER: char = '/';
const DELETE_SHORTHAND: &str = "-";

/// True if `pattern` matches anywhere in the update's searchable text.
pub fn matches_pattern(pattern: &Regex, update: &Update) -> bool {
    let (text, _) = searchable_text(update);
    pattern.is_match(&text)
}

/// Owned form of [`matches_pattern`], for handing to a dispatcher.
pub fn pattern(pattern: Regex) -> impl Fn(&Update) -> bool + Clone + Send + Sync + 'static {
    move |update: &Update| matches_pattern(&pattern, update)
}

/// Text or caption starts with `/`.
pub fn is_command(update: &Update) -> bool {
    let Some(m) = message_of(update) else {
        return false;
    };
    [m.text(), m.caption()]
        .into_iter()
        .flatten()
        .any(|s| s.starts_with(COMMAND_MARKER))
}

/// Service message about a member leaving the chat.
pub fn member_left(update: &Update) -> bool {
    match &update.kind {
        UpdateKind::Message(m) => m.left_chat_member().is_some(),
        _ => false,
    }
}

/// Service message about members joining the chat.
pub fn member_joined(update: &Update) -> bool {
    match &update.kind {
        UpdateKind::Message(m) => m.new_chat_members().is_some_and(|users| !users.is_empty()),
        _ => false,
    }
}

/// A plain `-` sent as a reply: asks for the replied-to message to be deleted.
pub fn is_delete_shorthand(update: &Update) -> bool {
    match &update.kind {
        UpdateKind::Message(m) => {
            m.reply_to_message().is_some() && m.text() == Some(DELETE_SHORTHAND)
        }
        _ => false,
    }
}
