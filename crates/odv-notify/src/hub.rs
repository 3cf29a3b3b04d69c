//! Broadcast hub for user-facing notifications

use async_trait::async_trait;
use futures::stream::{self, Stream};
use odv_core::{Notifier, NotifyError};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Message delivered to every connected listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationMessage {
    Notification { message: String },
    Progress { message: String },
}

impl NotificationMessage {
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Notification { message } | Self::Progress { message } => message,
        }
    }

    /// Wire form sent to listeners.
    pub fn to_json(&self) -> Result<String, NotifyError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Fan-out of notifications to any number of listeners.
///
/// Sending with nobody listening is not an error. A listener that falls
/// more than `capacity` messages behind skips the oldest ones.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<NotificationMessage>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        info!(capacity, "Notification hub initialized");
        Self { tx }
    }

    pub fn from_config(config: &odv_core::NotifyConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Register a new listener.
    pub fn subscribe(&self) -> Subscription {
        let rx = self.tx.subscribe();
        debug!(listeners = self.listener_count(), "Listener connected");
        Subscription { rx }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send to every listener. Returns how many listeners received it.
    pub fn send(&self, message: NotificationMessage) -> usize {
        match self.tx.send(message) {
            Ok(count) => {
                debug!(listeners = count, "Notification sent");
                count
            }
            Err(_) => {
                debug!("Notification dropped, no listeners");
                0
            }
        }
    }

    pub fn send_notification(&self, message: impl Into<String>) -> usize {
        let message = message.into();
        info!(message = %message, "Notification");
        self.send(NotificationMessage::notification(message))
    }

    pub fn send_progress(&self, message: impl Into<String>) -> usize {
        self.send(NotificationMessage::progress(message))
    }

    /// Relay a JSON message received from a listener. Unknown types and
    /// malformed JSON are logged and ignored.
    pub fn relay(&self, raw: &str) -> usize {
        match serde_json::from_str::<NotificationMessage>(raw) {
            Ok(message) => self.send(message),
            Err(e) => {
                warn!(error = %e, "Ignoring inbound message");
                0
            }
        }
    }
}

#[async_trait]
impl Notifier for NotificationHub {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        self.send_notification(message);
        Ok(())
    }
}

/// One listener's view of the hub.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<NotificationMessage>,
}

impl Subscription {
    /// Next message, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<NotificationMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Listener lagged, messages skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next message in wire form.
    pub async fn recv_json(&mut self) -> Option<Result<String, NotifyError>> {
        self.recv().await.map(|message| message.to_json())
    }

    pub fn into_stream(self) -> impl Stream<Item = NotificationMessage> {
        stream::unfold(self, |mut subscription| async move {
            let message = subscription.recv().await?;
            Some((message, subscription))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            NotificationMessage::notification("Verbale salvato").to_json().unwrap(),
            r#"{"type":"notification","message":"Verbale salvato"}"#
        );
        assert_eq!(
            NotificationMessage::progress("50%").to_json().unwrap(),
            r#"{"type":"progress","message":"50%"}"#
        );
    }

    #[test]
    fn test_send_without_listeners() {
        let hub = NotificationHub::new(8);
        assert_eq!(hub.send_notification("nobody"), 0);
    }

    #[tokio::test]
    async fn test_every_listener_receives() {
        let hub = NotificationHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        assert_eq!(hub.send_progress("Trascrizione 1/3"), 2);

        assert_eq!(first.recv().await, Some(NotificationMessage::progress("Trascrizione 1/3")));
        assert_eq!(
            second.recv_json().await.unwrap().unwrap(),
            r#"{"type":"progress","message":"Trascrizione 1/3"}"#
        );
    }

    #[tokio::test]
    async fn test_notifier_sends_notification() {
        let hub = NotificationHub::default();
        let mut listener = hub.subscribe();
        let notifier: &dyn Notifier = &hub;

        notifier.notify("OneDrive upload a.txt: quota").await.unwrap();

        assert_eq!(
            listener.recv().await.map(|m| m.message().to_string()),
            Some("OneDrive upload a.txt: quota".to_string())
        );
    }

    #[tokio::test]
    async fn test_relay_inbound() {
        let hub = NotificationHub::new(8);
        let mut listener = hub.subscribe();

        assert_eq!(hub.relay(r#"{"type":"notification","message":"ciao"}"#), 1);
        assert_eq!(hub.relay(r#"{"type":"chat","message":"x"}"#), 0);
        assert_eq!(hub.relay("not json"), 0);

        assert_eq!(listener.recv().await, Some(NotificationMessage::notification("ciao")));
    }

    #[tokio::test]
    async fn test_lagging_listener_skips_oldest() {
        let hub = NotificationHub::new(2);
        let mut listener = hub.subscribe();

        for i in 0..4 {
            hub.send_progress(format!("step {i}"));
        }

        assert_eq!(listener.recv().await, Some(NotificationMessage::progress("step 2")));
        assert_eq!(listener.recv().await, Some(NotificationMessage::progress("step 3")));
    }

    #[tokio::test]
    async fn test_stream_ends_when_hub_dropped() {
        let hub = NotificationHub::new(4);
        let stream = hub.subscribe().into_stream();
        hub.send_notification("a");
        hub.send_notification("b");
        drop(hub);

        let messages: Vec<String> = stream.map(|m| m.message().to_string()).collect().await;
        assert_eq!(messages, vec!["a", "b"]);
    }
}
