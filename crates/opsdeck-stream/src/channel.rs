use std::pin::Pin;

use futures_core::Stream;
use opsdeck_schema::EventFilter;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::error::StreamError;
use crate::snapshot::ApiClient;
use crate::sse::{self, SseMessage};

/// Named message carrying one JSON turn on the roundtable stream.
pub const TURN_EVENT: &str = "turn";
/// Named message signalling roundtable session termination.
pub const SESSION_COMPLETE_EVENT: &str = "session_complete";

/// One live push-channel subscription.
///
/// Opening performs the HTTP handshake; a returned channel means the
/// server accepted the subscription (the open/ready signal). Dropping the
/// channel is teardown — idempotent by construction, and the discipline of
/// dropping the old channel before opening a new one keeps at most one
/// live subscription per feed.
pub struct Channel {
    messages: Pin<Box<dyn Stream<Item = Result<SseMessage, StreamError>> + Send>>,
}

impl Channel {
    /// Subscribe to the filtered event stream, resuming after
    /// `last_event_id` when one is known so no events fall in the gap
    /// between the snapshot and the first pushed item.
    pub async fn open_events(
        client: &ApiClient,
        filter: &EventFilter,
        last_event_id: Option<&str>,
    ) -> Result<Self, StreamError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(agent_id) = filter.agent_id.as_deref() {
            params.push(("agent_id", agent_id));
        }
        if let Some(kind) = filter.kind.as_deref() {
            params.push(("kind", kind));
        }
        if let Some(id) = last_event_id {
            params.push(("last_event_id", id));
        }
        Self::open(client, "/events/stream", &params).await
    }

    /// Subscribe to one roundtable session's turn stream.
    pub async fn open_turns(client: &ApiClient, session_id: &str) -> Result<Self, StreamError> {
        Self::open(client, "/roundtable/stream", &[("session_id", session_id)]).await
    }

    async fn open(
        client: &ApiClient,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Self, StreamError> {
        let url = client.endpoint(path, params)?;
        debug!(%url, "opening push channel");

        let resp = client.http().get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StreamError::from_status(status));
        }

        Ok(Self {
            messages: Box::pin(sse::decode(resp.bytes_stream())),
        })
    }

    /// Next decoded message; `None` when the server closed the stream.
    pub async fn next(&mut self) -> Option<Result<SseMessage, StreamError>> {
        self.messages.next().await
    }
}
