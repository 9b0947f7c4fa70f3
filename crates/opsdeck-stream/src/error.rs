use reqwest::StatusCode;

/// Failures the streaming client can observe.
///
/// Only `Network` is ever surfaced to the view layer (as the feed's error
/// text); the rest are handled internally by the reconnection policy or
/// dropped at the channel boundary.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Non-success HTTP status on a snapshot or history fetch.
    #[error("event store returned {status}")]
    Network { status: StatusCode },

    /// Transport-level failure (connect, read, mid-stream drop).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A pushed message whose payload failed to parse. Non-fatal: the
    /// channel drops the message and keeps reading.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The push channel ended (server closed the stream).
    #[error("push channel closed")]
    Closed,

    /// The configured base URL does not combine into a valid endpoint.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl StreamError {
    pub(crate) fn from_status(status: StatusCode) -> Self {
        Self::Network { status }
    }
}
