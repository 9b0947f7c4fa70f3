use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use opsdeck_schema::{Event, EventFilter};
use opsdeck_stream::{ApiClient, ConnectionStatus, EventFeed, FeedOptions, TurnFeed};

#[derive(Parser)]
#[command(name = "opsdeck", version, about = "opsdeck console stream client")]
struct Cli {
    #[arg(
        long,
        default_value = "http://127.0.0.1:3000",
        help = "Event store base URL"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Follow the live event feed")]
    Tail {
        #[arg(long, help = "Restrict to one agent's events")]
        agent: Option<String>,
        #[arg(long, help = "Restrict to one event kind")]
        kind: Option<String>,
        #[arg(long, default_value = "500", help = "Visible buffer capacity")]
        limit: usize,
        #[arg(long, default_value = "5", help = "Fallback poll period in seconds")]
        poll_secs: u64,
    },
    #[command(about = "Follow one roundtable session transcript")]
    Turns {
        #[arg(long, help = "Session id to follow")]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::debug!(base_url = %cli.base_url, "connecting to event store");
    let client = ApiClient::new(cli.base_url);

    match cli.command {
        Commands::Tail {
            agent,
            kind,
            limit,
            poll_secs,
        } => {
            let options = FeedOptions {
                filter: EventFilter {
                    agent_id: agent,
                    kind,
                },
                capacity: limit,
                poll_interval: Duration::from_secs(poll_secs.max(1)),
            };
            tail_events(client, options).await
        }
        Commands::Turns { session } => tail_turns(client, session).await,
    }
}

async fn tail_events(client: ApiClient, options: FeedOptions) -> Result<()> {
    let feed = EventFeed::spawn(client, options);
    let mut state_rx = feed.subscribe();
    let mut printed: HashSet<String> = HashSet::new();
    let mut last_status = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();

                if last_status != Some(state.status) {
                    last_status = Some(state.status);
                    eprintln!("-- connection: {}", status_label(state.status));
                }
                if let Some(err) = &state.error {
                    eprintln!("-- error: {err}");
                }
                // Oldest unseen first so the terminal reads chronologically.
                for event in state.events.iter().rev() {
                    if printed.insert(event.id.clone()) {
                        println!(
                            "{} [{}] {} {}",
                            event.created_at.format("%H:%M:%S"),
                            event.agent_id,
                            event.kind,
                            event.title
                        );
                    }
                }
                prune_seen(&mut printed, &state.events);
            }
        }
    }

    feed.close();
    Ok(())
}

async fn tail_turns(client: ApiClient, session: String) -> Result<()> {
    let feed = TurnFeed::spawn(client, session);
    let mut state_rx = feed.subscribe();
    let mut next_turn = 0u64;
    let mut was_live = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();

                for turn in state.turns.iter() {
                    if turn.turn_number >= next_turn {
                        println!("#{} {}: {}", turn.turn_number, turn.speaker, turn.dialogue);
                        next_turn = turn.turn_number + 1;
                    }
                }
                if state.is_complete {
                    eprintln!("-- session complete");
                    break;
                }
                if state.is_live {
                    was_live = true;
                } else if was_live {
                    eprintln!("-- live channel lost; transcript may be partial");
                    break;
                }
            }
        }
    }

    feed.close();
    Ok(())
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Reconnecting => "reconnecting",
        ConnectionStatus::Polling => "polling",
    }
}

/// Keep the seen-id set bounded by the visible buffer. Ids evicted from
/// the capped buffer can never reappear, so a long-running tail need not
/// remember them.
fn prune_seen(seen: &mut HashSet<String>, visible: &[Event]) {
    if seen.len() <= visible.len() {
        return;
    }
    let keep: HashSet<&str> = visible.iter().map(|e| e.id.as_str()).collect();
    seen.retain(|id| keep.contains(id.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str) -> Event {
        Event {
            id: id.into(),
            agent_id: "scout-1".into(),
            kind: "task_started".into(),
            title: format!("event {id}"),
            summary: None,
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prune_drops_ids_evicted_from_the_buffer() {
        let mut seen: HashSet<String> =
            ["1", "2", "3", "4"].iter().map(|s| s.to_string()).collect();
        let visible = vec![event("4"), event("3")];

        prune_seen(&mut seen, &visible);

        assert_eq!(seen.len(), 2);
        assert!(seen.contains("3"));
        assert!(seen.contains("4"));
    }

    #[test]
    fn prune_is_a_noop_while_the_set_fits_the_buffer() {
        let mut seen: HashSet<String> = HashSet::from(["2".to_string()]);
        let visible = vec![event("2"), event("1")];

        prune_seen(&mut seen, &visible);

        assert_eq!(seen.len(), 1);
    }
}

