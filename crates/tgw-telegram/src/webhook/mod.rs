//! Webhook delivery: the HTTP endpoint, the transports that feed it and the
//! manager that establishes them and registers the result with Telegram.

mod manager;
mod server;
mod transport;

use teloxide::types::Update;
use tokio::{sync::mpsc, task::JoinHandle};

use tgw_core::{domain::WebhookRegistration, errors::Error, Result};

pub use manager::WebhookManager;
pub use server::{webhook_router, SECRET_TOKEN_HEADER};
pub use transport::{
    DirectTransport, StopHandle, Transport, TunnelAcceptTransport, TunnelServeTransport,
};

/// An established webhook: the update channel plus the handle that stops it.
pub struct Webhook {
    updates: mpsc::Receiver<Update>,
    handle: WebhookHandle,
}

impl Webhook {
    pub fn handle(&self) -> &WebhookHandle {
        &self.handle
    }

    pub fn split(self) -> (mpsc::Receiver<Update>, WebhookHandle) {
        (self.updates, self.handle)
    }
}

pub struct WebhookHandle {
    registration: WebhookRegistration,
    stop: StopHandle,
    task: JoinHandle<Result<()>>,
}

impl WebhookHandle {
    pub fn registration(&self) -> &WebhookRegistration {
        &self.registration
    }

    /// Stop the transport and wait for serving to end.
    pub async fn stop(self) -> Result<()> {
        self.stop.stop();
        self.join().await
    }

    /// Wait for serving to end without stopping it.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(res) => res,
            Err(e) => Err(Error::Serve(format!("webhook task failed: {e}"))),
        }
    }
}
