//! Generative text service contract

use async_trait::async_trait;

use crate::Result;

/// External service turning a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model or service name, for logs.
    fn name(&self) -> &str {
        "generator"
    }
}
