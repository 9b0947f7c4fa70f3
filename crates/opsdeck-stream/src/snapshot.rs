use opsdeck_schema::{Event, EventFilter, EventPage, Turn, TurnPage};
use url::Url;

use crate::error::StreamError;

/// HTTP client for the event store's query endpoints.
///
/// Used for the initial snapshot before the push channel opens and as the
/// fallback data source once a feed has degraded to polling.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn endpoint(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, StreamError> {
        let mut url = Url::parse(&format!("{}{}", self.base, path))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Fetch one page of events, newest first, the server's ordering
    /// trusted as-is. The first element's id is the continuation token for
    /// a subsequent stream open or poll.
    pub async fn fetch_events(
        &self,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<Event>, StreamError> {
        let limit = limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![("limit", limit.as_str())];
        if let Some(agent_id) = filter.agent_id.as_deref() {
            params.push(("agent_id", agent_id));
        }
        if let Some(kind) = filter.kind.as_deref() {
            params.push(("kind", kind));
        }
        let url = self.endpoint("/events", &params)?;

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StreamError::from_status(status));
        }

        let page: EventPage = resp.json().await?;
        Ok(page.events)
    }

    /// Fetch the full turn history of one session, sorted ascending by
    /// turn number. Sessions are short-lived, so no paging.
    pub async fn fetch_turns(&self, session_id: &str) -> Result<Vec<Turn>, StreamError> {
        let url = self.endpoint("/turns", &[("session_id", session_id)])?;

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StreamError::from_status(status));
        }

        let page: TurnPage = resp.json().await?;
        let mut turns = page.turns;
        turns.sort_by_key(|t| t.turn_number);
        Ok(turns)
    }
}
