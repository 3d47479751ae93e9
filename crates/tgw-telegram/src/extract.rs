//! Flatten an update into the text predicates match against.

use teloxide::types::{Message, Update, UpdateKind};

/// The message an update carries, looking at new/edited messages and
/// new/edited channel posts in that order.
pub fn message_of(update: &Update) -> Option<&Message> {
    match &update.kind {
        UpdateKind::Message(m)
        | UpdateKind::EditedMessage(m)
        | UpdateKind::ChannelPost(m)
        | UpdateKind::EditedChannelPost(m) => Some(m),
        _ => None,
    }
}

/// Text and caption of the message, followed by text and caption of the
/// message it replies to (one level only), each followed by a single space.
///
/// Missing parts contribute an empty string, and the trailing space is kept,
/// so exact comparisons must account for it. Returns `("", None)` when the
/// update carries no message.
pub fn searchable_text(update: &Update) -> (String, Option<&Message>) {
    let Some(m) = message_of(update) else {
        return (String::new(), None);
    };

    let mut text = String::new();
    push_part(&mut text, m.text());
    push_part(&mut text, m.caption());
    if let Some(re) = m.reply_to_message() {
        push_part(&mut text, re.text());
        push_part(&mut text, re.caption());
    }
    (text, Some(m))
}

fn push_part(out: &mut String, part: Option<&str>) {
    out.push_str(part.unwrap_or_default());
    out.push(' ');
}
