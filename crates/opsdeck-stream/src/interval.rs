use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

type PollFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type PollFn = Box<dyn FnMut() -> PollFuture + Send>;

/// Fixed-period poller that always runs the latest handler.
///
/// The handler lives in a single-owner cell written eagerly on every
/// `schedule` call and read only from the poller's own task, so a
/// re-schedule never captures stale parameters. The underlying interval is
/// re-created only when the period value actually changes; swapping the
/// handler alone causes no timer churn. A `None` period disables ticking.
pub struct Poller {
    handler: Arc<Mutex<Option<PollFn>>>,
    period_tx: watch::Sender<Option<Duration>>,
    cancel: CancellationToken,
}

impl Poller {
    /// Spawn the poller task. Starts disabled.
    pub fn spawn() -> Self {
        let handler: Arc<Mutex<Option<PollFn>>> = Arc::new(Mutex::new(None));
        let (period_tx, period_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        tokio::spawn(run(handler.clone(), period_rx, cancel.clone()));

        Self {
            handler,
            period_tx,
            cancel,
        }
    }

    /// Replace the handler and (re)arm the period. The handler swap takes
    /// effect on the next tick even when the period is unchanged. A zero
    /// period is clamped to 1ms (`tokio::time::interval` rejects zero).
    pub fn schedule<F, Fut>(&self, mut callback: F, period: Option<Duration>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.map(|p| p.max(Duration::from_millis(1)));
        {
            let mut slot = self.handler.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(Box::new(move || -> PollFuture { Box::pin(callback()) }));
        }
        self.period_tx.send_if_modified(|current| {
            if *current == period {
                false
            } else {
                *current = period;
                true
            }
        });
    }

    /// Stop ticking without tearing the task down.
    pub fn disable(&self) {
        self.period_tx.send_if_modified(|current| {
            if current.is_none() {
                false
            } else {
                *current = None;
                true
            }
        });
    }

    /// Tear down the poller task. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    handler: Arc<Mutex<Option<PollFn>>>,
    mut period_rx: watch::Receiver<Option<Duration>>,
    cancel: CancellationToken,
) {
    loop {
        // Park until a period is set.
        let period = loop {
            if let Some(p) = *period_rx.borrow_and_update() {
                break p;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = period_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        };

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = period_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    // Period changed: rebuild (or park) with the new value.
                    break;
                }
                _ = ticker.tick() => {
                    let fut = {
                        let mut slot = handler.lock().unwrap_or_else(|e| e.into_inner());
                        slot.as_mut().map(|f| f())
                    };
                    if let Some(fut) = fut {
                        // Drop an in-flight invocation on cancel so a slow
                        // poll finishing after teardown mutates nothing.
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = fut => {}
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ticks_on_the_configured_period() {
        let hits = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn();

        let counter = hits.clone();
        poller.schedule(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            Some(Duration::from_secs(5)),
        );

        // First tick fires immediately, then every 5s.
        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        poller.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn none_period_disables() {
        let hits = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn();

        let counter = hits.clone();
        poller.schedule(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            None,
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        poller.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_clamped_not_panicking() {
        let hits = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn();

        let counter = hits.clone();
        poller.schedule(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            Some(Duration::ZERO),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(hits.load(Ordering::SeqCst) >= 1);
        poller.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn disable_parks_an_armed_poller() {
        let hits = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn();

        let counter = hits.clone();
        poller.schedule(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            Some(Duration::from_secs(1)),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(hits.load(Ordering::SeqCst) >= 1);

        poller.disable();
        let parked_at = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), parked_at);
        poller.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_swaps_handler_without_restarting_interval() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn();

        let counter = first.clone();
        poller.schedule(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            Some(Duration::from_secs(5)),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);

        // Same period, new handler: only the handler cell changes.
        let counter = second.clone();
        poller.schedule(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            Some(Duration::from_secs(5)),
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert!(second.load(Ordering::SeqCst) >= 1);
        poller.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_stops_ticks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn();

        let counter = hits.clone();
        poller.schedule(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            Some(Duration::from_secs(1)),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        poller.cancel();
        poller.cancel();
        let before = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), before);
    }
}
