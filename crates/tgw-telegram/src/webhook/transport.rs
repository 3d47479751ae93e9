//! The three ways a webhook router gets its connections.
//!
//! Every transport exposes the same stop behavior (cancel a token) but what the
//! token is wired to differs: graceful shutdown of a bound listener, or the
//! broker session behind a tunnel.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{serve::Listener, Router};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_util::sync::CancellationToken;

use tgw_core::{
    debugf, errorf,
    errors::Error,
    logging::Logger,
    ports::{AcceptError, Tunnel, TunnelIo},
    Result,
};

/// Strategy for serving the webhook router.
#[async_trait]
pub trait Transport: Send + 'static {
    fn name(&self) -> &'static str;

    /// Handle for stopping a running [`Transport::start`]; grab it before
    /// `start` consumes the transport.
    fn stop_handle(&self) -> StopHandle;

    /// Serve `app` until stopped or until the underlying listener goes away.
    async fn start(self: Box<Self>, app: Router) -> Result<()>;
}

/// Stop behavior of a transport.
#[derive(Clone)]
pub struct StopHandle {
    token: CancellationToken,
    transport: &'static str,
    logger: Arc<dyn Logger>,
}

impl StopHandle {
    fn new(token: CancellationToken, transport: &'static str, logger: Arc<dyn Logger>) -> Self {
        Self {
            token,
            transport,
            logger,
        }
    }

    pub fn stop(&self) {
        debugf!(self.logger, "stopping {} transport", self.transport);
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============== Direct ==============

/// Locally bound listener, reachable by the platform without help.
pub struct DirectTransport {
    listener: TcpListener,
    shutdown: CancellationToken,
    logger: Arc<dyn Logger>,
}

impl DirectTransport {
    /// Bind `addr`. A bind failure is reported as [`Error::Bind`].
    pub async fn bind(addr: &str, logger: Arc<dyn Logger>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            listener,
            shutdown: CancellationToken::new(),
            logger,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.shutdown.clone(), self.name(), self.logger.clone())
    }

    async fn start(self: Box<Self>, app: Router) -> Result<()> {
        let Self {
            listener,
            shutdown,
            logger,
        } = *self;

        if let Ok(addr) = listener.local_addr() {
            debugf!(logger, "direct webhook listening on {addr}");
        }
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Serve(e.to_string()))?;
        debugf!(logger, "direct webhook stopped");
        Ok(())
    }
}

// ============== Tunnel, server-driven ==============

/// The HTTP server drives the tunnel as its listener.
///
/// Broker-side closure (or cancellation) ends serving cleanly; any other
/// accept failure is returned from `start` as [`Error::Serve`].
pub struct TunnelServeTransport {
    tunnel: Box<dyn Tunnel>,
    cancel: CancellationToken,
    logger: Arc<dyn Logger>,
}

impl TunnelServeTransport {
    /// `cancel` must be the token the tunnel was opened with.
    pub fn new(tunnel: Box<dyn Tunnel>, cancel: CancellationToken, logger: Arc<dyn Logger>) -> Self {
        Self {
            tunnel,
            cancel,
            logger,
        }
    }
}

#[async_trait]
impl Transport for TunnelServeTransport {
    fn name(&self) -> &'static str {
        "tunnel"
    }

    fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.cancel.clone(), self.name(), self.logger.clone())
    }

    async fn start(self: Box<Self>, app: Router) -> Result<()> {
        let Self {
            tunnel,
            cancel,
            logger,
        } = *self;

        debugf!(logger, "serving webhook over tunnel {}", tunnel.url());
        let (outcome_tx, mut outcome_rx) = oneshot::channel();
        let listener = TunnelListener {
            tunnel,
            cancel: cancel.clone(),
            outcome: Some(outcome_tx),
        };

        let shutdown = cancel.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        cancel.cancel();

        if let Err(e) = served {
            errorf!(logger, "tunnel serve: {e}");
            return Err(Error::Serve(e.to_string()));
        }
        match outcome_rx.try_recv() {
            Ok(AcceptError::Failed(reason)) => {
                errorf!(logger, "tunnel serve: {reason}");
                Err(Error::Serve(reason))
            }
            Ok(AcceptError::Closed) | Err(_) => {
                debugf!(logger, "tunnel serve finished: tunnel closed");
                Ok(())
            }
        }
    }
}

/// Adapts a [`Tunnel`] to `axum::serve`.
///
/// `Listener::accept` cannot fail, so a terminal accept outcome is recorded,
/// the tunnel token cancelled (which also triggers graceful shutdown) and the
/// listener parks until the server stops polling it.
struct TunnelListener {
    tunnel: Box<dyn Tunnel>,
    cancel: CancellationToken,
    outcome: Option<oneshot::Sender<AcceptError>>,
}

impl Listener for TunnelListener {
    type Io = Box<dyn TunnelIo>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            if self.outcome.is_none() {
                std::future::pending::<()>().await;
            }

            let accepted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(AcceptError::Closed),
                res = self.tunnel.accept() => res,
            };
            match accepted {
                Ok(conn) => return (conn.io, conn.remote_addr),
                Err(e) => {
                    if let Some(tx) = self.outcome.take() {
                        let _ = tx.send(e);
                    }
                    self.cancel.cancel();
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "tunnel listener has no local address",
        ))
    }
}

// ============== Tunnel, accept loop ==============

/// Connections are pulled from the tunnel one at a time and each is served on
/// its own task; the server never owns the listener.
///
/// Closure ends the loop silently. Other accept failures are logged and also
/// end the loop (the broker side is assumed gone); neither is returned as an
/// error.
pub struct TunnelAcceptTransport {
    tunnel: Box<dyn Tunnel>,
    cancel: CancellationToken,
    logger: Arc<dyn Logger>,
}

impl TunnelAcceptTransport {
    /// `cancel` must be the token the tunnel was opened with.
    pub fn new(tunnel: Box<dyn Tunnel>, cancel: CancellationToken, logger: Arc<dyn Logger>) -> Self {
        Self {
            tunnel,
            cancel,
            logger,
        }
    }
}

#[async_trait]
impl Transport for TunnelAcceptTransport {
    fn name(&self) -> &'static str {
        "tunnel-accept"
    }

    fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.cancel.clone(), self.name(), self.logger.clone())
    }

    async fn start(self: Box<Self>, app: Router) -> Result<()> {
        let Self {
            mut tunnel,
            cancel,
            logger,
        } = *self;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AcceptError::Closed),
                res = tunnel.accept() => res,
            };
            let conn = match accepted {
                Ok(conn) => conn,
                Err(AcceptError::Closed) => {
                    debugf!(logger, "tunnel accept loop done: tunnel closed");
                    break;
                }
                Err(AcceptError::Failed(reason)) => {
                    errorf!(logger, "tunnel accept: {reason}");
                    break;
                }
            };

            let remote = conn.remote_addr;
            debugf!(logger, "{remote} => {}", tunnel.forwards_to());

            let service = TowerToHyperService::new(app.clone());
            let logger = logger.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let builder = auto::Builder::new(TokioExecutor::new());
                let served = builder.serve_connection(TokioIo::new(conn.io), service);
                tokio::pin!(served);

                // Once stopped, finish the in-flight request and close, so the
                // router (and the update sender it holds) is released.
                let mut shutting_down = false;
                let result = loop {
                    tokio::select! {
                        res = served.as_mut() => break res,
                        _ = cancel.cancelled(), if !shutting_down => {
                            served.as_mut().graceful_shutdown();
                            shutting_down = true;
                        }
                    }
                };
                match result {
                    Ok(()) => debugf!(logger, "connection from {remote} served"),
                    Err(e) => errorf!(logger, "serve connection from {remote}: {e}"),
                }
            });
        }

        cancel.cancel();
        Ok(())
    }
}
