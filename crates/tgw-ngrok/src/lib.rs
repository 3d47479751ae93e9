//! ngrok adapter (tunnel broker).
//!
//! Opens an HTTP endpoint on an ngrok session and hands its connections to the
//! webhook transports through the `tgw-core` tunnel ports.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use ngrok::{prelude::*, session::SessionBuilder, tunnel::HttpTunnel, Session};
use tokio_util::sync::CancellationToken;

use tgw_core::{
    errors::Error,
    ports::{AcceptError, Tunnel, TunnelBroker, TunnelConn},
    Result,
};

#[derive(Clone, Debug, Default)]
pub struct NgrokBroker {
    authtoken: Option<String>,
}

impl NgrokBroker {
    /// Without an explicit token the session reads `NGROK_AUTHTOKEN` itself.
    pub fn new(authtoken: Option<String>) -> Self {
        Self {
            authtoken: authtoken.filter(|t| !t.trim().is_empty()),
        }
    }

    fn session_builder(&self) -> SessionBuilder {
        let mut builder = Session::builder();
        match &self.authtoken {
            Some(token) => {
                builder.authtoken(token.clone());
            }
            None => {
                builder.authtoken_from_env();
            }
        }
        builder
    }

    async fn connect(&self) -> Result<Session> {
        self.session_builder()
            .connect()
            .await
            .map_err(|e| Error::Tunnel(format!("ngrok connect: {e}")))
    }
}

#[async_trait]
impl TunnelBroker for NgrokBroker {
    async fn probe(&self, timeout: Duration) -> Result<()> {
        let mut session = tokio::time::timeout(timeout, self.connect())
            .await
            .map_err(|_| Error::Tunnel(format!("ngrok connect timed out after {timeout:?}")))??;
        let _ = session.close().await;
        Ok(())
    }

    async fn listen(&self, cancel: CancellationToken) -> Result<Box<dyn Tunnel>> {
        let session = self.connect().await?;
        let tunnel = session
            .http_endpoint()
            .listen()
            .await
            .map_err(|e| Error::Tunnel(format!("ngrok listen: {e}")))?;

        // The session lives until the token fires, whoever cancels it.
        let mut closer = session.clone();
        let watch = cancel.clone();
        tokio::spawn(async move {
            watch.cancelled().await;
            let _ = closer.close().await;
        });

        Ok(Box::new(NgrokTunnel { tunnel, cancel }))
    }
}

pub struct NgrokTunnel {
    tunnel: HttpTunnel,
    cancel: CancellationToken,
}

#[async_trait]
impl Tunnel for NgrokTunnel {
    fn url(&self) -> &str {
        EndpointInfo::url(&self.tunnel)
    }

    fn id(&self) -> &str {
        TunnelInfo::id(&self.tunnel)
    }

    fn forwards_to(&self) -> &str {
        TunnelInfo::forwards_to(&self.tunnel)
    }

    async fn accept(&mut self) -> std::result::Result<TunnelConn, AcceptError> {
        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AcceptError::Closed),
            next = self.tunnel.try_next() => next,
        };
        match next {
            Ok(Some(conn)) => {
                let remote_addr = conn.remote_addr();
                Ok(TunnelConn {
                    io: Box::new(Box::pin(conn)),
                    remote_addr,
                })
            }
            Ok(None) => Err(AcceptError::Closed),
            Err(_) if self.cancel.is_cancelled() => Err(AcceptError::Closed),
            Err(e) => Err(AcceptError::Failed(e.to_string())),
        }
    }
}
