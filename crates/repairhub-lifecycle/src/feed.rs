//! Change feed for the lifecycle tables and its debounced subscriber.
//!
//! Every committed lifecycle mutation publishes a [`ChangeEvent`]. A
//! dashboard subscribes through [`ChangeFeed::subscribe_debounced`]: bursts
//! of events are coalesced into one [`Refresh`] once the feed has been
//! quiet for the debounce interval. The timer lives inside the
//! subscription's task, so dropping or unsubscribing cancels it.

use std::collections::BTreeSet;
use std::time::Duration;

use repairhub_core::models::change::{ChangeEvent, LifecycleTable};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace, warn};

/// Fan-out of lifecycle change events.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish one event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!(table = %event.table, receivers, "change published"),
            Err(_) => trace!(table = %event.table, "change published with no subscribers"),
        }
    }

    /// Raw, undebounced stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribe with a debounce of `interval`. `on_refresh` runs once per
    /// quiet period that followed at least one event.
    pub fn subscribe_debounced<F>(&self, interval: Duration, on_refresh: F) -> DebouncedSubscription
    where
        F: FnMut(Refresh) + Send + 'static,
    {
        let receiver = self.sender.subscribe();
        let handle = tokio::spawn(run_debounced(receiver, DebounceTimer::new(interval), on_refresh));
        DebouncedSubscription {
            handle: Some(handle),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Coalesced batch of events delivered to a debounced subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Refresh {
    /// Tables touched during the burst.
    pub tables: BTreeSet<LifecycleTable>,
    /// Number of events in the burst, including any the receiver missed.
    pub events: u64,
}

impl Refresh {
    fn record(&mut self, event: ChangeEvent) {
        self.tables.insert(event.table);
        self.events += 1;
    }

    /// A lagged receiver cannot know which tables it missed.
    fn record_lost(&mut self, missed: u64) {
        self.tables.extend(LifecycleTable::ALL.iter().copied());
        self.events += missed;
    }

    fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// A single resettable deadline.
///
/// Each event pushes the deadline out to `now + interval`; the timer
/// fires once the deadline passes without another reset.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Cancel any pending deadline and schedule a fresh one.
    pub fn reset(&mut self) {
        self.deadline = Some(Instant::now() + self.interval);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_debounced<F>(
    mut receiver: broadcast::Receiver<ChangeEvent>,
    mut timer: DebounceTimer,
    mut on_refresh: F,
) where
    F: FnMut(Refresh),
{
    let mut pending = Refresh::default();
    loop {
        let deadline = timer.deadline();
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(event) => {
                    pending.record(event);
                    timer.reset();
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "debounced subscriber lagged behind the change feed");
                    pending.record_lost(missed);
                    timer.reset();
                }
                Err(RecvError::Closed) => {
                    debug!("change feed closed");
                    break;
                }
            },
            () = wait_for(deadline) => {
                timer.cancel();
                if !pending.is_empty() {
                    on_refresh(std::mem::take(&mut pending));
                }
            }
        }
    }
}

/// Handle owning a debounced subscriber task.
///
/// The task, and with it any pending timer, is aborted by
/// [`unsubscribe`](Self::unsubscribe) or on drop. No refresh fires after
/// either.
#[derive(Debug)]
pub struct DebouncedSubscription {
    handle: Option<JoinHandle<()>>,
}

impl DebouncedSubscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for DebouncedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
