//! Operator notifications.
//!
//! Webhook handlers never talk to a notifier directly. They write rows to the
//! outbox and [`crate::outbox`] delivers them through a [`Notifier`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::config::NotifySettings;
use crate::error::{AppError, Result};

/// Delays between in-call retries after a transient failure.
const RETRY_DELAYS: &[u64] = &[1, 4];

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier unreachable: {0}")]
    Transport(String),

    #[error("notifier rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl NotifyError {
    /// Network errors, rate limits and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Transport(_) => true,
            NotifyError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver one HTML-formatted message.
    async fn send(&self, message: &str) -> std::result::Result<(), NotifyError>;
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Sends to a Telegram chat through the Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    retry_delays: Vec<Duration>,
}

impl TelegramNotifier {
    pub fn new(
        api_base: &str,
        bot_token: &str,
        chat_id: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build Telegram client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            retry_delays: RETRY_DELAYS.iter().map(|s| Duration::from_secs(*s)).collect(),
        })
    }

    /// Replace the in-call retry schedule. An empty list means a single attempt.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    async fn send_once(&self, message: &str) -> std::result::Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_base, self.bot_token))
            .json(&SendMessageRequest {
                chat_id: &self.chat_id,
                text: message,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(300).collect(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: &str) -> std::result::Result<(), NotifyError> {
        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO)
            .chain(self.retry_delays.iter().copied())
            .enumerate()
        {
            if !delay.is_zero() {
                tracing::warn!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Retrying Telegram send after transient failure"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(message).await {
                Ok(()) => {
                    tracing::info!(attempt, "Telegram notification sent");
                    return Ok(());
                }
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => {
                    tracing::error!(error = %e, "Telegram rejected notification");
                    return Err(e);
                }
            }
        }

        tracing::error!(
            attempts = self.retry_delays.len() + 1,
            "Telegram send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| NotifyError::Transport("no attempt made".into())))
    }
}

/// Logs the message and reports success. Used when no chat is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &str) -> std::result::Result<(), NotifyError> {
        tracing::info!(%message, "Operator notification (Telegram not configured)");
        Ok(())
    }
}

pub fn notifier_from_settings(settings: &NotifySettings) -> Result<Arc<dyn Notifier>> {
    match (&settings.telegram_bot_token, &settings.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Ok(Arc::new(TelegramNotifier::new(
            &settings.telegram_api_base,
            token,
            chat_id,
            settings.timeout,
        )?)),
        _ => {
            tracing::warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
