//! Webhook mode.
//!
//! teloxide's axum router calls `setWebhook` on start and `deleteWebhook` on
//! shutdown. It is served on the configured port together with `/health`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::*;
use teloxide::update_listeners::UpdateListener;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing::{error, info};
use url::Url;

use super::dispatcher::ThrottledBot;
use super::health;
use crate::config::Config;
use crate::database::UserStore;
use crate::error::ConfigError;

/// Start the bot in webhook mode and dispatch until Ctrl+C.
pub async fn start_webhook(
    config: &Config,
    mut dispatcher: Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey>,
    bot: ThrottledBot,
    users: Arc<dyn UserStore>,
) -> anyhow::Result<()> {
    let webhook_url = config
        .webhook_url
        .as_deref()
        .ok_or(ConfigError::Missing("WEBHOOK_URL"))?;
    let url = Url::parse(webhook_url).map_err(|_| ConfigError::Invalid {
        name: "WEBHOOK_URL".to_string(),
        value: webhook_url.to_string(),
    })?;

    let address = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let options = Options::new(address, url.clone());

    info!("🔗 Setting webhook URL: {}", url);
    info!("📡 Listening on: {}", address);

    // setWebhook only needs the plain bot
    let (mut listener, stop_flag, router) = webhooks::axum_to_router(bot.inner().clone(), options)
        .await
        .context("failed to set up webhook")?;
    let stop_token = listener.stop_token();
    let app = router.merge(health::router(users));

    tokio::spawn(async move {
        let tcp = match tokio::net::TcpListener::bind(address).await {
            Ok(tcp) => tcp,
            Err(e) => {
                error!("Failed to bind {}: {}", address, e);
                stop_token.stop();
                return;
            }
        };
        if let Err(e) = axum::serve(tcp, app).with_graceful_shutdown(stop_flag).await {
            error!("Webhook server error: {}", e);
            stop_token.stop();
        }
    });

    info!("✅ Webhook setup complete, waiting for updates...");

    let error_handler = LoggingErrorHandler::with_custom_text("Error from update listener");
    dispatcher.dispatch_with_listener(listener, error_handler).await;
    Ok(())
}
