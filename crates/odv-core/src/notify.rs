//! Notification channel contract.
//!
//! Notifications are a side channel only: a failed send never changes the
//! outcome of the operation that triggered it.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    Closed,

    #[error("Notification serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Best-effort sink for user-facing notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notifier_as_trait_object() {
        let recorder = RecordingNotifier {
            messages: Mutex::new(Vec::new()),
        };
        let notifier: &dyn Notifier = &recorder;

        notifier.notify("Verbale salvato").await.unwrap();
        NoopNotifier.notify("ignored").await.unwrap();

        assert_eq!(*recorder.messages.lock().unwrap(), vec!["Verbale salvato"]);
    }
}
