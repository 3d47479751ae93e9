use std::sync::Arc;

use anyhow::Context;
use regex::Regex;
use teloxide::{
    prelude::*,
    types::{Message, UpdateKind},
};

use tgw_core::{
    config::{Config, WebhookMode},
    debugf,
    domain::{resolve_secret_and_path, ChatId, MessageId, MessageRef},
    errorf,
    errors::Error,
    logging::{Logger, RedactingLogger},
    messaging::port::MessagingPort,
    notify::ErrorNotifier,
    ports::TunnelBroker,
};

use crate::{
    extract::message_of,
    predicates,
    webhook::{Webhook, WebhookManager},
    TelegramMessenger,
};

/// What the predicate library says about one update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub command: bool,
    pub member_joined: bool,
    pub member_left: bool,
    pub delete_shorthand: bool,
    pub watch_hit: bool,
}

pub fn classify(update: &Update, watch: Option<&Regex>) -> Classification {
    Classification {
        command: predicates::is_command(update),
        member_joined: predicates::member_joined(update),
        member_left: predicates::member_left(update),
        delete_shorthand: predicates::is_delete_shorthand(update),
        watch_hit: watch.is_some_and(|re| predicates::matches_pattern(re, update)),
    }
}

/// Consumes updates coming off the webhook channel.
#[derive(Clone)]
pub struct UpdateHandler {
    messenger: Arc<dyn MessagingPort>,
    logger: Arc<dyn Logger>,
    watch: Option<Regex>,
}

impl UpdateHandler {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        logger: Arc<dyn Logger>,
        watch: Option<Regex>,
    ) -> Self {
        Self {
            messenger,
            logger,
            watch,
        }
    }

    pub async fn handle(&self, update: &Update) -> Classification {
        let class = classify(update, self.watch.as_ref());
        let chat = message_of(update).map(|m| m.chat.id.0);
        debugf!(self.logger, "update {} chat {:?}: {:?}", update.id, chat, class);

        if class.watch_hit {
            debugf!(self.logger, "update {} matched watch pattern", update.id);
        }
        if class.delete_shorthand {
            if let UpdateKind::Message(m) = &update.kind {
                self.delete_with_reply(m).await;
            }
        }
        class
    }

    /// Delete the replied-to message, then the `-` itself. Both best-effort.
    async fn delete_with_reply(&self, m: &Message) {
        let targets = m.reply_to_message().map(message_ref).into_iter().chain([message_ref(m)]);
        for target in targets {
            if let Err(e) = self.messenger.delete_message(target).await {
                debugf!(
                    self.logger,
                    "delete message {} in chat {}: {e}",
                    target.message_id.0,
                    target.chat_id.0
                );
            }
        }
    }
}

fn message_ref(m: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(m.chat.id.0),
        message_id: MessageId(m.id.0),
    }
}

async fn establish(cfg: &Config, manager: &WebhookManager) -> tgw_core::Result<Webhook> {
    match cfg.webhook_mode {
        WebhookMode::Direct => {
            let public_url = cfg.webhook_public_url.as_deref().ok_or_else(|| {
                Error::Config("WEBHOOK_PUBLIC_URL is required for direct webhook mode".to_string())
            })?;
            let (secret, path) = resolve_secret_and_path(
                Some(cfg.direct_secret_token()),
                cfg.webhook_path.clone(),
                String::new,
            );
            manager
                .establish_direct(&secret, public_url, &path, &cfg.webhook_bind_addr)
                .await
        }
        WebhookMode::Tunnel => {
            manager
                .establish_via_tunnel_serve(cfg.webhook_secret_token.clone(), cfg.webhook_path.clone())
                .await
        }
        WebhookMode::TunnelAccept => {
            manager
                .establish_via_tunnel_accept(cfg.webhook_secret_token.clone(), cfg.webhook_path.clone())
                .await
        }
    }
}

pub async fn run_webhook(cfg: Arc<Config>, broker: Arc<dyn TunnelBroker>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    if let Ok(me) = bot.get_me().await {
        tracing::info!("tgw started: @{}", me.username());
    }

    let logger: Arc<dyn Logger> = Arc::new(RedactingLogger);
    let messenger = Arc::new(TelegramMessenger::new(bot));
    let notifier = ErrorNotifier::new(
        Some(messenger.clone() as Arc<dyn MessagingPort>),
        cfg.notify_chat_ids.iter().copied().map(ChatId).collect(),
    );
    let watch = cfg
        .update_watch_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid UPDATE_WATCH_PATTERN")?;

    let manager = WebhookManager::new(messenger.clone(), logger.clone())
        .with_broker(broker)
        .with_queue_capacity(cfg.update_queue_capacity)
        .with_probe_timeout(cfg.tunnel_probe_timeout);

    let webhook = match establish(&cfg, &manager).await {
        Ok(webhook) => webhook,
        Err(e) => {
            errorf!(logger, "establish {:?} webhook: {e}", cfg.webhook_mode);
            notifier.notify(Some(&e)).await;
            return Err(e.into());
        }
    };
    let (mut updates, handle) = webhook.split();
    tracing::info!(
        "webhook registered at {} ({:?})",
        handle.registration().public_url,
        cfg.webhook_mode
    );

    let handler = UpdateHandler::new(messenger, logger.clone(), watch);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            next = updates.recv() => match next {
                Some(update) => {
                    handler.handle(&update).await;
                }
                None => {
                    debugf!(logger, "update channel closed");
                    break;
                }
            },
            _ = &mut interrupt => {
                tracing::info!("interrupt received, stopping webhook");
                break;
            }
        }
    }

    if let Err(e) = handle.stop().await {
        errorf!(logger, "webhook stopped with error: {e}");
        notifier.notify(Some(&e)).await;
        return Err(e.into());
    }
    Ok(())
}
