use std::{fmt, sync::Arc};

use crate::{domain::ChatId, formatting::code, messaging::port::MessagingPort};

const ERROR_MARKER: &str = "💥";

/// Best-effort delivery of fatal errors to an operator chat.
///
/// Destinations are fixed at construction; only the first one is used.
#[derive(Clone)]
pub struct ErrorNotifier {
    client: Option<Arc<dyn MessagingPort>>,
    destinations: Vec<ChatId>,
}

impl ErrorNotifier {
    pub fn new(client: Option<Arc<dyn MessagingPort>>, destinations: Vec<ChatId>) -> Self {
        Self {
            client,
            destinations,
        }
    }

    /// Send `err` to the first destination. Failures are swallowed.
    pub async fn notify(&self, err: Option<&(dyn fmt::Display + Sync)>) {
        let (Some(client), Some(&chat_id), Some(err)) =
            (self.client.as_ref(), self.destinations.first(), err)
        else {
            return;
        };
        let html = format_error(&err.to_string());
        let _ = client.send_html(chat_id, &html).await;
    }
}

pub fn format_error(err: &str) -> String {
    format!("{ERROR_MARKER} {}", code(err))
}
