//! Fixtures and port fakes shared by the unit tests.

use std::{
    fmt,
    panic::Location,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use teloxide::types::Update;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tgw_core::{
    domain::{ChatId, MessageId, MessageRef, WebhookRegistration},
    errors::Error,
    logging::{redact_bot_token, Logger},
    messaging::port::MessagingPort,
    ports::{AcceptError, Tunnel, TunnelBroker, TunnelConn, WebhookRegistrar},
    Result,
};

// ============== Update fixtures ==============

pub fn message() -> Value {
    json!({
        "message_id": 11,
        "date": 1640359576,
        "chat": {"id": 42, "first_name": "Ada", "username": "ada", "type": "private"},
        "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"}
    })
}

pub fn channel_post() -> Value {
    json!({
        "message_id": 12,
        "date": 1640359576,
        "chat": {"id": -1001234, "title": "news", "type": "channel"}
    })
}

pub fn with_text(mut m: Value, text: &str) -> Value {
    m["text"] = json!(text);
    m
}

pub fn with_caption(mut m: Value, caption: &str) -> Value {
    m["photo"] = json!([{
        "file_id": "AgAD",
        "file_unique_id": "AQAD",
        "file_size": 1024,
        "width": 90,
        "height": 90
    }]);
    m["caption"] = json!(caption);
    m
}

pub fn photo_message(caption: &str) -> Value {
    with_caption(message(), caption)
}

pub fn reply_to(mut m: Value, replied: Value) -> Value {
    m["reply_to_message"] = replied;
    m
}

pub fn new_members_message() -> Value {
    json!({
        "message_id": 13,
        "date": 1640359576,
        "chat": {"id": -5, "title": "group", "type": "group"},
        "from": {"id": 42, "is_bot": false, "first_name": "Ada"},
        "new_chat_members": [{"id": 7, "is_bot": false, "first_name": "Neo"}]
    })
}

pub fn left_member_message() -> Value {
    json!({
        "message_id": 14,
        "date": 1640359576,
        "chat": {"id": -5, "title": "group", "type": "group"},
        "from": {"id": 42, "is_bot": false, "first_name": "Ada"},
        "left_chat_member": {"id": 7, "is_bot": false, "first_name": "Neo"}
    })
}

pub fn update_json(kind: &str, m: Value) -> Value {
    let mut u = json!({"update_id": 1001});
    u[kind] = m;
    u
}

/// Parsed from text like the webhook body is; `from_value` loses the update kind.
pub fn update(kind: &str, m: Value) -> Update {
    serde_json::from_str(&update_json(kind, m).to_string()).expect("valid update fixture")
}

// ============== Logger ==============

#[derive(Default)]
pub struct RecordingLogger {
    pub debug: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn debug_lines(&self) -> Vec<String> {
        self.debug.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Logger for RecordingLogger {
    fn debugf(&self, _at: &'static Location<'static>, args: fmt::Arguments<'_>) {
        if let Ok(mut v) = self.debug.lock() {
            v.push(redact_bot_token(&args.to_string()).into_owned());
        }
    }

    fn errorf(&self, _at: &'static Location<'static>, args: fmt::Arguments<'_>) {
        if let Ok(mut v) = self.errors.lock() {
            v.push(redact_bot_token(&args.to_string()).into_owned());
        }
    }
}

// ============== Messenger ==============

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(ChatId, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub fail: bool,
}

impl RecordingMessenger {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        if let Ok(mut v) = self.sent.lock() {
            v.push((chat_id, html.to_string()));
        }
        if self.fail {
            return Err(Error::External("telegram error: blocked".to_string()));
        }
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        if let Ok(mut v) = self.deleted.lock() {
            v.push(msg);
        }
        if self.fail {
            return Err(Error::External("message to delete not found".to_string()));
        }
        Ok(())
    }
}

// ============== Registrar ==============

#[derive(Default)]
pub struct FakeRegistrar {
    pub calls: Mutex<Vec<WebhookRegistration>>,
    pub reject: bool,
}

impl FakeRegistrar {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<WebhookRegistration> {
        self.calls.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WebhookRegistrar for FakeRegistrar {
    async fn set_webhook(&self, registration: &WebhookRegistration) -> Result<()> {
        if let Ok(mut v) = self.calls.lock() {
            v.push(registration.clone());
        }
        if self.reject {
            return Err(Error::Registration("Bad Request: bad webhook".to_string()));
        }
        Ok(())
    }
}

// ============== Tunnel ==============

pub type AcceptResult = std::result::Result<TunnelConn, AcceptError>;

/// Tunnel fed from a channel; once the sender is dropped it reports `Closed`.
pub struct FakeTunnel {
    pub url: String,
    pub id: String,
    pub conns: mpsc::Receiver<AcceptResult>,
}

#[async_trait]
impl Tunnel for FakeTunnel {
    fn url(&self) -> &str {
        &self.url
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn forwards_to(&self) -> &str {
        "fake"
    }

    async fn accept(&mut self) -> AcceptResult {
        self.conns.recv().await.unwrap_or(Err(AcceptError::Closed))
    }
}

pub struct FakeBroker {
    pub probe_ok: bool,
    pub fail_listen: bool,
    pub listens: AtomicUsize,
    pub tunnel: Mutex<Option<FakeTunnel>>,
    pub cancel: Mutex<Option<CancellationToken>>,
}

impl FakeBroker {
    /// Broker handing out one tunnel, plus the sender that feeds it.
    pub fn with_tunnel(url: &str, id: &str) -> (Self, mpsc::Sender<AcceptResult>) {
        let (tx, conns) = mpsc::channel(8);
        let tunnel = FakeTunnel {
            url: url.to_string(),
            id: id.to_string(),
            conns,
        };
        let broker = Self {
            probe_ok: true,
            fail_listen: false,
            listens: AtomicUsize::new(0),
            tunnel: Mutex::new(Some(tunnel)),
            cancel: Mutex::new(None),
        };
        (broker, tx)
    }

    pub fn listen_calls(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.cancel.lock().ok().and_then(|c| c.clone())
    }
}

#[async_trait]
impl TunnelBroker for FakeBroker {
    async fn probe(&self, _timeout: Duration) -> Result<()> {
        if self.probe_ok {
            Ok(())
        } else {
            Err(Error::External("failed to connect session".to_string()))
        }
    }

    async fn listen(&self, cancel: CancellationToken) -> Result<Box<dyn Tunnel>> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut c) = self.cancel.lock() {
            *c = Some(cancel);
        }
        if self.fail_listen {
            return Err(Error::External("authentication failed".to_string()));
        }
        let tunnel = self
            .tunnel
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .ok_or_else(|| Error::Tunnel("fake tunnel already handed out".to_string()))?;
        Ok(Box::new(tunnel))
    }
}

/// Raw HTTP/1.1 POST of `body` with the secret header, closing afterwards.
pub fn http_post(path: &str, secret: &str, body: &str) -> String {
    raw_post(path, secret, body, "close")
}

/// Same as [`http_post`] but asks the server to keep the connection open.
pub fn http_post_keep_alive(path: &str, secret: &str, body: &str) -> String {
    raw_post(path, secret, body, "keep-alive")
}

fn raw_post(path: &str, secret: &str, body: &str, connection: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: tunnel.test\r\nContent-Type: application/json\r\n\
         X-Telegram-Bot-Api-Secret-Token: {secret}\r\nContent-Length: {}\r\n\
         Connection: {connection}\r\n\r\n{body}",
        body.len()
    )
}
