//! Debounced change-feed subscriptions, on tokio's paused clock.

use std::time::Duration;

use repairhub_core::models::change::{ChangeEvent, LifecycleTable};
use repairhub_lifecycle::{ChangeFeed, DebouncedSubscription, Refresh};
use tokio::sync::mpsc;
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_millis(1000);

fn subscribe(feed: &ChangeFeed) -> (DebouncedSubscription, mpsc::UnboundedReceiver<Refresh>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = feed.subscribe_debounced(INTERVAL, move |refresh| {
        let _ = tx.send(refresh);
    });
    (subscription, rx)
}

#[tokio::test(start_paused = true)]
async fn burst_coalesces_into_one_refresh() {
    let feed = ChangeFeed::new(64);
    let (_subscription, mut refreshes) = subscribe(&feed);

    for _ in 0..5 {
        feed.publish(ChangeEvent::update(LifecycleTable::Repairs));
    }
    feed.publish(ChangeEvent::insert(LifecycleTable::ReplacementRequests));

    sleep(Duration::from_millis(1100)).await;

    let refresh = refreshes.try_recv().unwrap();
    assert_eq!(refresh.events, 6);
    assert_eq!(
        refresh.tables.into_iter().collect::<Vec<_>>(),
        vec![LifecycleTable::Repairs, LifecycleTable::ReplacementRequests]
    );
    assert!(refreshes.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn each_event_resets_the_timer() {
    let feed = ChangeFeed::new(64);
    let (_subscription, mut refreshes) = subscribe(&feed);

    feed.publish(ChangeEvent::insert(LifecycleTable::Devices));
    sleep(Duration::from_millis(600)).await;
    feed.publish(ChangeEvent::update(LifecycleTable::Devices));
    sleep(Duration::from_millis(600)).await;

    // 1200 ms after the first event, but only 600 ms after the last.
    assert!(refreshes.try_recv().is_err());

    sleep(Duration::from_millis(500)).await;
    let refresh = refreshes.try_recv().unwrap();
    assert_eq!(refresh.events, 2);
}

#[tokio::test(start_paused = true)]
async fn separate_bursts_refresh_separately() {
    let feed = ChangeFeed::new(64);
    let (_subscription, mut refreshes) = subscribe(&feed);

    feed.publish(ChangeEvent::insert(LifecycleTable::Warranties));
    sleep(Duration::from_millis(1500)).await;
    feed.publish(ChangeEvent::insert(LifecycleTable::Repairs));
    sleep(Duration::from_millis(1500)).await;

    let first = refreshes.try_recv().unwrap();
    let second = refreshes.try_recv().unwrap();
    assert!(first.tables.contains(&LifecycleTable::Warranties));
    assert!(second.tables.contains(&LifecycleTable::Repairs));
    assert_eq!(first.events + second.events, 2);
}

#[tokio::test(start_paused = true)]
async fn quiet_feed_never_refreshes() {
    let feed = ChangeFeed::new(64);
    let (_subscription, mut refreshes) = subscribe(&feed);

    sleep(Duration::from_secs(10)).await;
    assert!(refreshes.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_cancels_pending_refresh() {
    let feed = ChangeFeed::new(64);
    let (subscription, mut refreshes) = subscribe(&feed);

    feed.publish(ChangeEvent::update(LifecycleTable::Repairs));
    sleep(Duration::from_millis(200)).await;
    subscription.unsubscribe();

    sleep(Duration::from_secs(5)).await;
    // The callback, and its sender, went away with the task.
    assert!(refreshes.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_subscription_cancels_it() {
    let feed = ChangeFeed::new(64);
    let (subscription, mut refreshes) = subscribe(&feed);
    assert!(subscription.is_active());

    feed.publish(ChangeEvent::update(LifecycleTable::Devices));
    sleep(Duration::from_millis(200)).await;
    drop(subscription);

    sleep(Duration::from_secs(5)).await;
    assert!(refreshes.recv().await.is_none());
    assert_eq!(feed.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn lagging_subscriber_refreshes_everything() {
    let feed = ChangeFeed::new(2);
    let (_subscription, mut refreshes) = subscribe(&feed);

    for _ in 0..10 {
        feed.publish(ChangeEvent::update(LifecycleTable::Repairs));
    }
    sleep(Duration::from_millis(1100)).await;

    let refresh = refreshes.try_recv().unwrap();
    assert_eq!(refresh.events, 10);
    assert_eq!(refresh.tables.len(), LifecycleTable::ALL.len());
}
