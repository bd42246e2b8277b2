//! Message Handler
//!
//! Free-form messages published to the payment channel, tagged with the
//! environment that sent them. Used to check queue connectivity end to end.

use crate::domain::Environment;
use crate::error::AppError;
use crate::messaging::EventPublisher;

pub const DEFAULT_MESSAGE: &str = "Default message";

#[derive(Clone)]
pub struct MessageHandler {
    publisher: EventPublisher,
    environment: Environment,
    commit_sha: Option<String>,
}

impl MessageHandler {
    pub fn new(publisher: EventPublisher, environment: Environment) -> Self {
        Self {
            publisher,
            environment,
            commit_sha: None,
        }
    }

    pub fn with_commit_sha(mut self, commit_sha: Option<String>) -> Self {
        self.commit_sha = commit_sha;
        self
    }

    pub fn welcome(&self) -> String {
        format!(
            "Welcome to the cross-cloud payment service! [Commit: {}] Use /publish?message=... to send a message.",
            self.commit_sha.as_deref().unwrap_or("unknown")
        )
    }

    /// Publish `[ENV] message` and return the text that was sent.
    pub async fn publish(&self, message: Option<&str>) -> Result<String, AppError> {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MESSAGE);
        let tagged = format!("[{}] {}", self.environment.as_str().to_ascii_uppercase(), message);

        tracing::info!(channel = %self.publisher.channel(), message = %tagged, "Publishing message");

        self.publisher.publish(&tagged).await.map_err(|e| {
            tracing::error!(error = %e, "Message publish failed");
            AppError::StoreUnavailable(e.to_string())
        })?;

        Ok(tagged)
    }
}
