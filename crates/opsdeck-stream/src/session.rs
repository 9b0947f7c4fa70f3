//! Session-scoped turn stream for one roundtable conversation.
//!
//! Unlike the general event feed this never reconnects: sessions are
//! finite, a partial transcript is an acceptable degraded result, and the
//! stream ends on an explicit `session_complete` message rather than
//! running forever.

use opsdeck_schema::{SessionComplete, Turn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::{Channel, SESSION_COMPLETE_EVENT, TURN_EVENT};
use crate::snapshot::ApiClient;

/// What a transcript view sees, ascending by turn number.
#[derive(Debug, Clone)]
pub struct TurnFeedState {
    pub turns: Vec<Turn>,
    /// Push channel currently delivering.
    pub is_live: bool,
    /// Terminal: the server declared the session finished.
    pub is_complete: bool,
    pub loading: bool,
}

impl TurnFeedState {
    fn initial() -> Self {
        Self {
            turns: Vec::new(),
            is_live: false,
            is_complete: false,
            loading: true,
        }
    }
}

/// Handle to a running session stream. One session per feed; to follow a
/// different session, close this feed and spawn a new one — the two never
/// overlap.
pub struct TurnFeed {
    state_rx: watch::Receiver<TurnFeedState>,
    cancel: CancellationToken,
}

impl TurnFeed {
    pub fn spawn(client: ApiClient, session_id: impl Into<String>) -> Self {
        let (state_tx, state_rx) = watch::channel(TurnFeedState::initial());
        let cancel = CancellationToken::new();

        tokio::spawn(run(client, session_id.into(), state_tx, cancel.clone()));

        Self { state_rx, cancel }
    }

    pub fn subscribe(&self) -> watch::Receiver<TurnFeedState> {
        self.state_rx.clone()
    }

    pub fn state(&self) -> TurnFeedState {
        self.state_rx.borrow().clone()
    }

    /// Idempotent teardown.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TurnFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Insert `turn` unless its number is already present, keeping the list
/// sorted ascending. Returns false on a duplicate.
fn insert_turn(turns: &mut Vec<Turn>, turn: Turn) -> bool {
    if turns.iter().any(|t| t.turn_number == turn.turn_number) {
        return false;
    }
    turns.push(turn);
    // Cheap at session scale; keeps the order invariant even when the
    // channel delivers slightly out of order.
    turns.sort_by_key(|t| t.turn_number);
    true
}

async fn run(
    client: ApiClient,
    session_id: String,
    state_tx: watch::Sender<TurnFeedState>,
    cancel: CancellationToken,
) {
    // Full history first; sessions are short-lived, no paging needed.
    let history = tokio::select! {
        _ = cancel.cancelled() => return,
        res = client.fetch_turns(&session_id) => res,
    };
    let mut turns = match history {
        Ok(turns) => turns,
        Err(e) => {
            // Degrade to live-only rather than showing nothing.
            warn!(error = %e, %session_id, "turn history fetch failed");
            Vec::new()
        }
    };
    let visible = turns.clone();
    state_tx.send_modify(|s| {
        s.turns = visible;
        s.loading = false;
    });

    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        res = Channel::open_turns(&client, &session_id) => res,
    };
    let mut channel = match opened {
        Ok(channel) => channel,
        Err(e) => {
            // No reconnects for session streams; the loaded history stands.
            warn!(error = %e, %session_id, "turn channel open failed");
            state_tx.send_modify(|s| s.is_live = false);
            return;
        }
    };
    state_tx.send_modify(|s| s.is_live = true);

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            msg = channel.next() => msg,
        };
        match msg {
            Some(Ok(push)) => match push.event.as_deref() {
                Some(SESSION_COMPLETE_EVENT) => {
                    // Presence alone terminates; the status text is
                    // informational and may be absent or unparsable.
                    let status = push
                        .parse::<SessionComplete>()
                        .ok()
                        .and_then(|c| c.status)
                        .unwrap_or_else(|| "done".to_string());
                    debug!(%session_id, %status, "session complete");
                    state_tx.send_modify(|s| {
                        s.is_complete = true;
                        s.is_live = false;
                    });
                    return;
                }
                Some(TURN_EVENT) | None => {
                    let turn: Turn = match push.parse() {
                        Ok(turn) => turn,
                        Err(e) => {
                            warn!(error = %e, %session_id, "dropping malformed turn payload");
                            continue;
                        }
                    };
                    if insert_turn(&mut turns, turn) {
                        let visible = turns.clone();
                        state_tx.send_modify(|s| s.turns = visible);
                    }
                }
                Some(other) => {
                    debug!(%session_id, event = other, "ignoring unknown push message");
                }
            },
            Some(Err(e)) => {
                warn!(error = %e, %session_id, "turn channel failed");
                state_tx.send_modify(|s| s.is_live = false);
                return;
            }
            None => {
                debug!(%session_id, "turn channel closed by server");
                state_tx.send_modify(|s| s.is_live = false);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(n: u64) -> Turn {
        Turn {
            session_id: "rt-1".into(),
            turn_number: n,
            speaker: format!("agent-{n}"),
            dialogue: "...".into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn insert_keeps_ascending_order_under_any_interleaving() {
        let mut turns = Vec::new();
        for n in [3, 1, 4, 2, 5] {
            assert!(insert_turn(&mut turns, turn(n)));
        }
        let numbers: Vec<u64> = turns.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn duplicate_turn_number_is_rejected() {
        let mut turns = Vec::new();
        assert!(insert_turn(&mut turns, turn(2)));
        assert!(!insert_turn(&mut turns, turn(2)));
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn server_gaps_pass_through_unchanged() {
        let mut turns = Vec::new();
        insert_turn(&mut turns, turn(1));
        insert_turn(&mut turns, turn(7));
        let numbers: Vec<u64> = turns.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![1, 7]);
    }
}
