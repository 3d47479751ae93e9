use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use tgw_core::{
    debugf,
    domain::{resolve_secret_and_path, WebhookRegistration},
    errors::Error,
    logging::Logger,
    ports::{Tunnel, TunnelBroker, WebhookRegistrar},
    Result,
};

use super::{
    server::webhook_router,
    transport::{DirectTransport, Transport, TunnelAcceptTransport, TunnelServeTransport},
    Webhook, WebhookHandle,
};

const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Establishes webhook delivery over one of three transports and registers the
/// resulting public URL with the platform.
#[derive(Clone)]
pub struct WebhookManager {
    registrar: Arc<dyn WebhookRegistrar>,
    broker: Option<Arc<dyn TunnelBroker>>,
    logger: Arc<dyn Logger>,
    queue_capacity: usize,
    probe_timeout: Duration,
}

/// A freshly opened tunnel whose token is still guarded: dropping this before
/// the webhook is registered tears the tunnel down.
struct OpenTunnel {
    tunnel: Box<dyn Tunnel>,
    cancel: CancellationToken,
    guard: DropGuard,
    registration: WebhookRegistration,
}

impl WebhookManager {
    pub fn new(registrar: Arc<dyn WebhookRegistrar>, logger: Arc<dyn Logger>) -> Self {
        Self {
            registrar,
            broker: None,
            logger,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_broker(mut self, broker: Arc<dyn TunnelBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Bind `bind_addr` locally and register `public_url + endpoint_path`.
    pub async fn establish_direct(
        &self,
        secret_token: &str,
        public_url: &str,
        endpoint_path: &str,
        bind_addr: &str,
    ) -> Result<Webhook> {
        let registration = WebhookRegistration::new(public_url, endpoint_path, secret_token);
        let transport = DirectTransport::bind(bind_addr, self.logger.clone()).await?;
        self.launch(Box::new(transport), registration).await
    }

    /// Open a tunnel and let the HTTP server drive it as its listener.
    ///
    /// A missing secret defaults to the tunnel id, a missing path to `/<secret>`.
    pub async fn establish_via_tunnel_serve(
        &self,
        secret_token: Option<String>,
        endpoint_path: Option<String>,
    ) -> Result<Webhook> {
        let OpenTunnel {
            tunnel,
            cancel,
            guard,
            registration,
        } = self.open_tunnel(secret_token, endpoint_path).await?;

        let transport = TunnelServeTransport::new(tunnel, cancel, self.logger.clone());
        let webhook = self.launch(Box::new(transport), registration).await?;
        guard.disarm();
        Ok(webhook)
    }

    /// Open a tunnel and serve each accepted connection on its own task.
    pub async fn establish_via_tunnel_accept(
        &self,
        secret_token: Option<String>,
        endpoint_path: Option<String>,
    ) -> Result<Webhook> {
        let OpenTunnel {
            tunnel,
            cancel,
            guard,
            registration,
        } = self.open_tunnel(secret_token, endpoint_path).await?;

        let transport = TunnelAcceptTransport::new(tunnel, cancel, self.logger.clone());
        let webhook = self.launch(Box::new(transport), registration).await?;
        guard.disarm();
        Ok(webhook)
    }

    async fn open_tunnel(
        &self,
        secret_token: Option<String>,
        endpoint_path: Option<String>,
    ) -> Result<OpenTunnel> {
        let broker = self
            .broker
            .as_ref()
            .ok_or_else(|| Error::Config("no tunnel broker configured".to_string()))?;

        // A second tunnel for the same free-tier identity makes `listen` hang,
        // so bail out early if a short-lived session cannot even be opened.
        broker
            .probe(self.probe_timeout)
            .await
            .map_err(|e| Error::TunnelAlreadyOpen(e.to_string()))?;

        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let tunnel = broker.listen(cancel.clone()).await.map_err(|e| match e {
            Error::Tunnel(_) => e,
            other => Error::Tunnel(other.to_string()),
        })?;

        let (secret, path) =
            resolve_secret_and_path(secret_token, endpoint_path, || tunnel.id().to_string());
        let registration = WebhookRegistration::new(tunnel.url(), path, secret);
        debugf!(
            self.logger,
            "{} {} {}",
            tunnel.url(),
            tunnel.forwards_to(),
            registration.endpoint_path
        );

        Ok(OpenTunnel {
            tunnel,
            cancel,
            guard,
            registration,
        })
    }

    /// Build the router, register the webhook, then start serving.
    async fn launch(
        &self,
        transport: Box<dyn Transport>,
        registration: WebhookRegistration,
    ) -> Result<Webhook> {
        let (tx, updates) = mpsc::channel(self.queue_capacity);
        let app = webhook_router(
            &registration.endpoint_path,
            &registration.secret_token,
            tx,
            self.logger.clone(),
        );

        debugf!(
            self.logger,
            "setWebhook {} via {} transport",
            registration.public_url,
            transport.name()
        );
        self.registrar
            .set_webhook(&registration)
            .await
            .map_err(|e| match e {
                Error::Registration(_) => e,
                other => Error::Registration(other.to_string()),
            })?;

        let stop = transport.stop_handle();
        let task = tokio::spawn(transport.start(app));

        Ok(Webhook {
            updates,
            handle: WebhookHandle {
                registration,
                stop,
                task,
            },
        })
    }
}
