use std::{env, fmt::Write as _, fs, path::Path, str::FromStr, time::Duration};

use sha2::{Digest, Sha256};

use crate::{errors::Error, Result};

/// How updates reach this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookMode {
    /// Local listener behind an address the platform can reach directly.
    Direct,
    /// ngrok tunnel; the HTTP server drives the tunnel listener.
    Tunnel,
    /// ngrok tunnel; connections are accepted one at a time and served individually.
    TunnelAccept,
}

impl FromStr for WebhookMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "tunnel" | "ngrok" => Ok(Self::Tunnel),
            "tunnel-accept" | "tunnel_accept" | "ngrok-accept" => Ok(Self::TunnelAccept),
            other => Err(Error::Config(format!(
                "WEBHOOK_MODE must be one of direct, tunnel, tunnel-accept (got {other:?})"
            ))),
        }
    }
}

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub notify_chat_ids: Vec<i64>,

    // Webhook
    pub webhook_mode: WebhookMode,
    pub webhook_public_url: Option<String>,
    pub webhook_bind_addr: String,
    pub webhook_path: Option<String>,
    pub webhook_secret_token: Option<String>,

    // Tunnel
    pub ngrok_authtoken: Option<String>,
    pub tunnel_probe_timeout: Duration,

    // Delivery
    pub update_queue_capacity: usize,
    /// Regex logged as a match when an update's text hits it.
    pub update_watch_pattern: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let notify_chat_ids = parse_csv_i64(get("TELEGRAM_NOTIFY_CHATS"));

        let webhook_public_url = get("WEBHOOK_PUBLIC_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string());
        let webhook_mode = match get("WEBHOOK_MODE") {
            Some(m) => m.parse()?,
            None if webhook_public_url.is_some() => WebhookMode::Direct,
            None => WebhookMode::Tunnel,
        };
        if webhook_mode == WebhookMode::Direct && webhook_public_url.is_none() {
            return Err(Error::Config(
                "WEBHOOK_PUBLIC_URL is required for direct webhook mode".to_string(),
            ));
        }

        let webhook_bind_addr =
            get("WEBHOOK_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8443".to_string());
        let webhook_path = get("WEBHOOK_PATH");
        let webhook_secret_token = get("WEBHOOK_SECRET_TOKEN");

        let ngrok_authtoken = get("NGROK_AUTHTOKEN");
        let tunnel_probe_timeout = Duration::from_millis(
            parse_num::<u64>(get("TUNNEL_PROBE_TIMEOUT_MS")).unwrap_or(1000),
        );

        let update_queue_capacity = parse_num::<usize>(get("UPDATE_QUEUE_CAPACITY"))
            .unwrap_or(100)
            .max(1);
        let update_watch_pattern = get("UPDATE_WATCH_PATTERN");

        Ok(Self {
            telegram_bot_token,
            notify_chat_ids,
            webhook_mode,
            webhook_public_url,
            webhook_bind_addr,
            webhook_path,
            webhook_secret_token,
            ngrok_authtoken,
            tunnel_probe_timeout,
            update_queue_capacity,
            update_watch_pattern,
        })
    }

    /// Secret for direct mode: configured value, else derived from the bot token
    /// so the endpoint path stays stable across restarts.
    pub fn direct_secret_token(&self) -> String {
        self.webhook_secret_token
            .clone()
            .unwrap_or_else(|| derive_secret_token(&self.telegram_bot_token))
    }
}

/// 32 hex chars of SHA-256 over the bot token. Only `[0-9a-f]`, which Telegram
/// accepts as a secret token.
pub fn derive_secret_token(bot_token: &str) -> String {
    let mut h = Sha256::new();
    h.update(b"tgw-webhook:");
    h.update(bot_token.as_bytes());
    let digest = h.finalize();
    hex_prefix(&digest, 32)
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
        if out.len() >= len {
            out.truncate(len);
            break;
        }
    }
    out
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_num<T: FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse::<T>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
