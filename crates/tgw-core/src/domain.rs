/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// What gets sent to `setWebhook`: where the platform should POST updates and
/// which secret it must echo back in every call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub public_url: String,
    pub endpoint_path: String,
    pub secret_token: String,
}

impl WebhookRegistration {
    pub fn new(
        public_url: impl Into<String>,
        endpoint_path: impl AsRef<str>,
        secret_token: impl Into<String>,
    ) -> Self {
        Self {
            public_url: public_url.into(),
            endpoint_path: normalize_endpoint_path(endpoint_path.as_ref()),
            secret_token: secret_token.into(),
        }
    }

    /// Fully qualified webhook URL (`public_url + endpoint_path`).
    pub fn url(&self) -> String {
        format!("{}{}", self.public_url, self.endpoint_path)
    }
}

/// Fill in the secret token and endpoint path when the caller left them out.
///
/// The secret falls back to `fallback_secret()`; the path falls back to
/// `/<secret>` so the endpoint is unguessable even without header checks.
pub fn resolve_secret_and_path(
    secret_token: Option<String>,
    endpoint_path: Option<String>,
    fallback_secret: impl FnOnce() -> String,
) -> (String, String) {
    let secret = secret_token
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(fallback_secret);
    let path = endpoint_path
        .filter(|p| !p.trim().is_empty())
        .map(|p| normalize_endpoint_path(&p))
        .unwrap_or_else(|| format!("/{secret}"));
    (secret, path)
}

pub fn normalize_endpoint_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
