//! Ports for the webhook transport: registering the webhook with the
//! platform and obtaining a public endpoint from a tunnel broker.

use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{domain::WebhookRegistration, Result};

/// Platform side of webhook delivery (`setWebhook`).
#[async_trait]
pub trait WebhookRegistrar: Send + Sync {
    async fn set_webhook(&self, registration: &WebhookRegistration) -> Result<()>;
}

/// Byte stream of one forwarded connection.
pub trait TunnelIo: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> TunnelIo for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// A connection handed out by the tunnel.
pub struct TunnelConn {
    pub io: Box<dyn TunnelIo>,
    pub remote_addr: SocketAddr,
}

impl std::fmt::Debug for TunnelConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConn")
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Why `Tunnel::accept` stopped handing out connections.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AcceptError {
    /// The tunnel was closed, either by cancellation or by the broker.
    #[error("tunnel closed")]
    Closed,

    #[error("accept failed: {0}")]
    Failed(String),
}

/// An open broker endpoint forwarding to this process.
#[async_trait]
pub trait Tunnel: Send {
    /// Public URL assigned by the broker (no trailing slash).
    fn url(&self) -> &str;
    /// Broker-assigned tunnel identifier.
    fn id(&self) -> &str;
    fn forwards_to(&self) -> &str;

    async fn accept(&mut self) -> std::result::Result<TunnelConn, AcceptError>;
}

/// A tunnel broker (ngrok in production, fakes in tests).
#[async_trait]
pub trait TunnelBroker: Send + Sync {
    /// Open and immediately close a session within `timeout`.
    ///
    /// Free-tier accounts hang in `listen` when a tunnel is already open for
    /// the same identity; a failing probe is how that case is detected.
    async fn probe(&self, timeout: Duration) -> Result<()>;

    /// Open an HTTP endpoint. The broker session is released once `cancel`
    /// fires.
    async fn listen(&self, cancel: CancellationToken) -> Result<Box<dyn Tunnel>>;
}
