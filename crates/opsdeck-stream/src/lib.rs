//! Resilient streaming client for the opsdeck console.
//!
//! Keeps a view synchronized with the event store's append-only log:
//! snapshot first, then a server-push channel resumed from a continuation
//! token, bounded-backoff reconnects on channel failure, and a fixed-period
//! polling fallback once the retry budget is spent. A session-scoped
//! variant ([`session::TurnFeed`]) follows one roundtable conversation and
//! terminates on the server's completion signal instead.

pub mod backoff;
pub mod buffer;
pub mod channel;
pub mod error;
pub mod feed;
pub mod interval;
pub mod session;
pub mod snapshot;
pub mod sse;

pub use backoff::*;
pub use buffer::*;
pub use channel::*;
pub use error::*;
pub use feed::*;
pub use interval::*;
pub use session::*;
pub use snapshot::*;
pub use sse::{SseMessage, SseParser};
