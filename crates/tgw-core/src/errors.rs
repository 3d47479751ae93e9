/// Core error type for the gateway.
///
/// Adapter crates map their specific errors into this type. The webhook
/// variants name the establishment phase that failed so the caller can tell a
/// busy broker apart from a rejected registration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tunnel already open: {0}")]
    TunnelAlreadyOpen(String),

    #[error("tunnel establish failed: {0}")]
    Tunnel(String),

    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("webhook registration failed: {0}")]
    Registration(String),

    #[error("webhook serve failed: {0}")]
    Serve(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
