//! Operator notifications.
//!
//! The engine reports starts, stops, hourly earnings and periodic summaries
//! through [`Notifier`]. Delivery failures are logged by [`notify_owner`] and
//! never reach the engine.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::NotifyError;

/// Sink for operator messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` on behalf of `owner`.
    async fn send(&self, owner: &str, text: &str) -> Result<(), NotifyError>;
}

/// Send and log on failure.
pub async fn notify_owner(notifier: &dyn Notifier, owner: &str, text: &str) {
    if let Err(e) = notifier.send(owner, text).await {
        warn!(owner = %owner, error = %e, "Failed to deliver notification");
    }
}

/// Writes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, owner: &str, text: &str) -> Result<(), NotifyError> {
        info!(owner = %owner, "{text}");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Telegram bot API sink.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Notifier posting to `chat_id` with bot `token`.
    pub fn new(token: &str, chat_id: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("https://api.telegram.org/bot{token}/sendMessage"),
            chat_id: chat_id.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, owner: &str, text: &str) -> Result<(), NotifyError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: format!("[{owner}] {text}"),
        };
        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, _owner: &str, text: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}

/// Telegram when both token and chat id are configured, the log otherwise.
pub fn from_config(config: &Config) -> Result<Box<dyn Notifier>, NotifyError> {
    match (&config.telegram_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Ok(Box::new(TelegramNotifier::new(token, chat_id.clone())?)),
        _ => Ok(Box::new(LogNotifier)),
    }
}
