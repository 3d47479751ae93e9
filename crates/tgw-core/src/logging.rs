use std::{borrow::Cow, fmt, panic::Location};

use crate::Result;

/// Initialize logging/tracing for the gateway.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tgw=info,tgw_core=info,tgw_telegram=info,tgw_ngrok=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("logging init failed: {e}")))?;

    Ok(())
}

/// Formatted logging capability handed to the webhook machinery.
///
/// Use the [`debugf!`](crate::debugf) and [`errorf!`](crate::errorf) macros
/// rather than calling these directly; they capture the call site.
pub trait Logger: Send + Sync {
    fn debugf(&self, at: &'static Location<'static>, args: fmt::Arguments<'_>);
    fn errorf(&self, at: &'static Location<'static>, args: fmt::Arguments<'_>);
}

#[macro_export]
macro_rules! debugf {
    ($log:expr, $($arg:tt)+) => {
        $log.debugf(::std::panic::Location::caller(), ::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! errorf {
    ($log:expr, $($arg:tt)+) => {
        $log.errorf(::std::panic::Location::caller(), ::std::format_args!($($arg)+))
    };
}

/// Logger that strips the bot token out of Bot API URLs before emitting.
#[derive(Clone, Copy, Debug, Default)]
pub struct RedactingLogger;

impl Logger for RedactingLogger {
    fn debugf(&self, at: &'static Location<'static>, args: fmt::Arguments<'_>) {
        tracing::debug!("{}", render(at, args));
    }

    fn errorf(&self, at: &'static Location<'static>, args: fmt::Arguments<'_>) {
        tracing::error!("{}", render(at, args));
    }
}

/// `file:line message`, with the message token-redacted.
pub fn render(at: &Location<'_>, args: fmt::Arguments<'_>) -> String {
    let message = args.to_string();
    format!(
        "{}:{} {}",
        short_file(at.file()),
        at.line(),
        redact_bot_token(&message)
    )
}

/// Remove the token from `.../bot<TOKEN>/method`.
///
/// Only the first `/bot` is considered. Without a `/` after it the input is
/// returned untouched.
pub fn redact_bot_token(s: &str) -> Cow<'_, str> {
    const MARKER: &str = "/bot";

    let Some(pos) = s.find(MARKER) else {
        return Cow::Borrowed(s);
    };
    let start = pos + MARKER.len();
    match s[start..].find('/') {
        Some(len) if len > 0 => {
            let mut out = String::with_capacity(s.len() - len);
            out.push_str(&s[..start]);
            out.push_str(&s[start + len..]);
            Cow::Owned(out)
        }
        _ => Cow::Borrowed(s),
    }
}

fn short_file(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
