//! Notification delivery as interchangeable strategies.
//!
//! `MessageSender` is the context object: it holds one `Notifier` at a time
//! and forwards `send` calls to it. `NotificationStrategyFactory` maps a
//! `NotificationChannel` onto its strategy. Email, SMS and push delivery are
//! simulated with a structured log record; in-app delivery is pushed to
//! connected WebSocket clients.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::NotificationChannel;
use super::ws::{WsMessage, broadcast_message};
use crate::errors::MarketError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationReceipt {
    pub success: bool,
    pub method: NotificationChannel,
    pub recipient: String,
    pub message: String,
    pub timestamp: String,
}

impl NotificationReceipt {
    fn delivered(method: NotificationChannel, recipient: &str, message: &str) -> Self {
        Self {
            success: true,
            method,
            recipient: recipient.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now()
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// One delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    async fn send(&self, recipient: &str, message: &str) -> Result<NotificationReceipt>;
}

pub struct EmailNotifier;

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<NotificationReceipt> {
        tracing::info!(channel = "email", recipient, message, "sending notification");
        Ok(NotificationReceipt::delivered(self.channel(), recipient, message))
    }
}

pub struct SmsNotifier;

#[async_trait]
impl Notifier for SmsNotifier {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Sms
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<NotificationReceipt> {
        tracing::info!(channel = "sms", recipient, message, "sending notification");
        Ok(NotificationReceipt::delivered(self.channel(), recipient, message))
    }
}

pub struct PushNotifier;

#[async_trait]
impl Notifier for PushNotifier {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Push
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<NotificationReceipt> {
        tracing::info!(channel = "push", recipient, message, "sending notification");
        Ok(NotificationReceipt::delivered(self.channel(), recipient, message))
    }
}

/// Delivers over the live event stream.
pub struct InAppNotifier {
    ws_tx: broadcast::Sender<String>,
}

impl InAppNotifier {
    pub fn new(ws_tx: broadcast::Sender<String>) -> Self {
        Self { ws_tx }
    }
}

#[async_trait]
impl Notifier for InAppNotifier {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::InApp
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<NotificationReceipt> {
        tracing::info!(channel = "inapp", recipient, message, "sending notification");
        let receipt = NotificationReceipt::delivered(self.channel(), recipient, message);
        broadcast_message(
            &self.ws_tx,
            &WsMessage::Notification {
                receipt: receipt.clone(),
            },
        );
        Ok(receipt)
    }
}

/// Context that delegates to whichever strategy is currently installed.
#[derive(Default)]
pub struct MessageSender {
    strategy: Option<Box<dyn Notifier>>,
}

impl MessageSender {
    pub fn new(strategy: Box<dyn Notifier>) -> Self {
        Self {
            strategy: Some(strategy),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn Notifier>) {
        self.strategy = Some(strategy);
    }

    pub fn channel(&self) -> Option<NotificationChannel> {
        self.strategy.as_ref().map(|s| s.channel())
    }

    pub async fn send(&self, recipient: &str, message: &str) -> Result<NotificationReceipt> {
        let strategy = self.strategy.as_ref().ok_or(MarketError::StrategyNotSet)?;
        strategy.send(recipient, message).await
    }
}

pub struct NotificationStrategyFactory;

impl NotificationStrategyFactory {
    pub fn create(
        channel: NotificationChannel,
        ws_tx: &broadcast::Sender<String>,
    ) -> Box<dyn Notifier> {
        match channel {
            NotificationChannel::Email => Box::new(EmailNotifier),
            NotificationChannel::Sms => Box::new(SmsNotifier),
            NotificationChannel::Push => Box::new(PushNotifier),
            NotificationChannel::InApp => Box::new(InAppNotifier::new(ws_tx.clone())),
        }
    }

    /// Case-insensitive lookup by wire name.
    pub fn from_name(
        name: &str,
        ws_tx: &broadcast::Sender<String>,
    ) -> Result<Box<dyn Notifier>, MarketError> {
        let channel: NotificationChannel = name.parse()?;
        Ok(Self::create(channel, ws_tx))
    }
}

/// Build a sender for `channel` and deliver one message.
pub async fn dispatch(
    channel: NotificationChannel,
    ws_tx: &broadcast::Sender<String>,
    recipient: &str,
    message: &str,
) -> Result<NotificationReceipt> {
    let sender = MessageSender::new(NotificationStrategyFactory::create(channel, ws_tx));
    sender.send(recipient, message).await
}
