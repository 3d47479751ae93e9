/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render `text` as an inline `<code>` span (escaped).
pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}
