use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use teloxide::types::Update;
use tokio::sync::mpsc;

use tgw_core::{debugf, errorf, logging::Logger};

/// Header Telegram uses to echo the secret token given to `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct WebhookState {
    tx: mpsc::Sender<Update>,
    secret_token: Arc<str>,
    logger: Arc<dyn Logger>,
}

/// Router with a single `POST endpoint_path` that checks the secret header and
/// forwards each decoded update into `tx`.
///
/// The header is checked before the body is looked at, so unauthenticated
/// calls always get 401.
///
/// The channel closes once every clone of the router is dropped, i.e. when the
/// transport serving it has stopped.
pub fn webhook_router(
    endpoint_path: &str,
    secret_token: &str,
    tx: mpsc::Sender<Update>,
    logger: Arc<dyn Logger>,
) -> Router {
    let state = WebhookState {
        tx,
        secret_token: Arc::from(secret_token),
        logger,
    };
    Router::new()
        .route(endpoint_path, post(handle_update))
        .with_state(state)
}

fn validate_secret_token(headers: &HeaderMap, expected: &str) -> Result<(), StatusCode> {
    let provided = headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided == expected {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn handle_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Err(status) = validate_secret_token(&headers, &state.secret_token) {
        debugf!(state.logger, "webhook call rejected: bad secret token");
        return status;
    }
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            debugf!(state.logger, "webhook call rejected: undecodable update: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    let id = update.id;
    if state.tx.send(update).await.is_err() {
        errorf!(state.logger, "update {id} dropped: update channel closed");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, http::Request};
    use teloxide::types::UpdateKind;
    use tower::util::ServiceExt;

    use super::*;
    use crate::testing::{message, update_json, with_text, RecordingLogger};

    fn app(tx: mpsc::Sender<Update>) -> Router {
        webhook_router("/hook", "s3cret", tx, Arc::new(RecordingLogger::default()))
    }

    fn request(path: &str, secret: Option<&str>) -> Request<Body> {
        let payload = update_json("message", with_text(message(), "hello"));
        raw_request(path, secret, payload.to_string())
    }

    fn raw_request(path: &str, secret: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_TOKEN_HEADER, secret);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn forwards_update_with_valid_secret() {
        let (tx, mut rx) = mpsc::channel(4);
        let res = app(tx).oneshot(request("/hook", Some("s3cret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let upd = rx.recv().await.unwrap();
        assert_eq!(upd.id, 1001);
        assert!(matches!(upd.kind, UpdateKind::Message(_)));
    }

    #[tokio::test]
    async fn rejects_wrong_or_missing_secret_without_enqueue() {
        let (tx, mut rx) = mpsc::channel(4);
        let router = app(tx);

        let res = router
            .clone()
            .oneshot(request("/hook", Some("nope")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router.oneshot(request("/hook", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .map(|u| u.is_none())
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn secret_is_checked_before_the_body() {
        let (tx, _rx) = mpsc::channel(4);
        let router = app(tx);

        let res = router
            .clone()
            .oneshot(raw_request("/hook", None, "not json".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router
            .clone()
            .oneshot(raw_request("/hook", Some("nope"), String::new()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router
            .oneshot(raw_request("/hook", Some("s3cret"), "not json".to_string()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_paths_are_not_routed() {
        let (tx, _rx) = mpsc::channel(4);
        let res = app(tx).oneshot(request("/other", Some("s3cret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn closed_channel_reports_unavailable() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let res = app(tx).oneshot(request("/hook", Some("s3cret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
