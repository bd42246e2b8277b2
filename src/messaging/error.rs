//! Messaging Errors

use uuid::Uuid;

use crate::backends::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Event could not be handed to the queue
    #[error("Publish to '{channel}' failed: {reason}")]
    PublishFailed { channel: String, reason: String },

    /// Message was processed but the queue did not accept the acknowledgement
    #[error("Acknowledgement of message {message_id} failed: {source}")]
    AckFailed {
        message_id: Uuid,
        source: BackendError,
    },
}
