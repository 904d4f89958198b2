//! Poll loop scheduling under a paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use powerctl_client::{PollEvent, PollLoop};
use powerctl_core::model::{Resource, ResourceId};
use powerctl_core::{Failure, FailureKind, Outcome};
use tokio::sync::broadcast;
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_secs(1);

fn resource(id: u64, running: bool) -> Resource {
    Resource {
        id: ResourceId::from(id),
        name: format!("VM-{id}"),
        running,
        uptime_seconds: None,
        assigned_owner: None,
    }
}

/// Fetcher that counts calls and replays `reply` every time.
fn fetcher(
    calls: &Arc<AtomicUsize>,
    reply: Outcome<Vec<Resource>>,
) -> impl Fn() -> std::future::Ready<Outcome<Vec<Resource>>> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(reply.clone())
    }
}

fn drain(events: &mut broadcast::Receiver<PollEvent>) -> Vec<PollEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn first_fetch_is_immediate_then_one_per_interval() {
    let poller = PollLoop::new();
    let calls = Arc::new(AtomicUsize::new(0));
    poller.start(fetcher(&calls, Ok(vec![resource(1, false)])), INTERVAL);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(poller.snapshot().map(|s| s.len()), Some(1));

    sleep(INTERVAL).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    sleep(INTERVAL * 2).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn no_fetch_after_stop() {
    let poller = PollLoop::new();
    let mut events = poller.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = poller.start(fetcher(&calls, Ok(Vec::new())), INTERVAL);

    sleep(Duration::from_millis(10)).await;
    assert!(poller.stop(handle));
    assert!(!poller.is_polling());

    sleep(INTERVAL * 5).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(drain(&mut events).contains(&PollEvent::Stopped(handle)));
}

#[tokio::test(start_paused = true)]
async fn stop_before_first_tick_issues_nothing() {
    let poller = PollLoop::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = poller.start(fetcher(&calls, Ok(Vec::new())), INTERVAL);
    assert!(poller.stop(handle));

    sleep(INTERVAL * 3).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_handles_are_ignored() {
    let poller = PollLoop::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = poller.start(fetcher(&calls, Ok(Vec::new())), INTERVAL);

    assert!(poller.stop(handle));
    assert!(!poller.stop(handle));
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_leaves_schedule_alone() {
    let poller = PollLoop::new();
    let ticks = Arc::new(AtomicUsize::new(0));
    poller.start(fetcher(&ticks, Ok(vec![resource(1, false)])), INTERVAL);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 1);

    sleep(Duration::from_millis(590)).await;
    let snapshot = poller
        .refresh_now(|| async { Ok(vec![resource(1, true), resource(2, false)]) })
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(poller.is_polling());

    // Still due at t=1000ms, not 600ms + interval.
    sleep(Duration::from_millis(410)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
    assert_eq!(poller.snapshot().map(|s| s.len()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn failures_keep_the_loop_ticking() {
    let poller = PollLoop::new();
    let mut events = poller.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));
    let failure = Failure::network("connection refused");
    poller.start(fetcher(&calls, Err(failure.clone())), INTERVAL);

    sleep(INTERVAL * 2 + Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(poller.is_polling());
    assert!(poller.snapshot().is_none());

    let failed = drain(&mut events)
        .into_iter()
        .filter(|e| *e == PollEvent::Failed(failure.clone()))
        .count();
    assert_eq!(failed, 3);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_stops_the_loop() {
    let poller = PollLoop::new();
    let mut events = poller.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = poller.start(
        fetcher(&calls, Err(Failure::unauthorized("Token has expired"))),
        INTERVAL,
    );

    sleep(Duration::from_millis(10)).await;
    assert!(!poller.is_polling());
    assert_eq!(
        drain(&mut events),
        vec![PollEvent::SessionExpired, PollEvent::Stopped(handle)]
    );

    sleep(INTERVAL * 5).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!poller.stop(handle));
}

#[tokio::test(start_paused = true)]
async fn unauthorized_manual_refresh_stops_the_loop() {
    let poller = PollLoop::new();
    let calls = Arc::new(AtomicUsize::new(0));
    poller.start(fetcher(&calls, Ok(Vec::new())), INTERVAL);
    sleep(Duration::from_millis(10)).await;

    let err = poller
        .refresh_now(|| async { Err(Failure::unauthorized("revoked")) })
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Unauthorized);
    assert!(!poller.is_polling());

    sleep(INTERVAL * 3).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn snapshot_is_replaced_wholesale() {
    let poller = PollLoop::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = {
        let calls = Arc::clone(&calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let resources = if n == 0 {
                vec![resource(1, false), resource(2, false)]
            } else {
                vec![resource(2, true)]
            };
            std::future::ready(Ok(resources))
        }
    };
    poller.start(fetch, INTERVAL);

    sleep(Duration::from_millis(10)).await;
    let first = poller.snapshot().unwrap();
    assert_eq!(first.len(), 2);

    sleep(INTERVAL).await;
    let second = poller.snapshot().unwrap();
    assert_eq!(second.len(), 1);
    assert!(second.get(&ResourceId::from(1)).is_none());
    assert!(second.is_running(&ResourceId::from(2)));
    // Readers holding the old snapshot keep a consistent view.
    assert_eq!(first.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn restarting_replaces_the_previous_loop() {
    let poller = PollLoop::new();
    let mut events = poller.subscribe();
    let old_calls = Arc::new(AtomicUsize::new(0));
    let new_calls = Arc::new(AtomicUsize::new(0));

    let old = poller.start(fetcher(&old_calls, Ok(Vec::new())), INTERVAL);
    let new = poller.start(fetcher(&new_calls, Ok(Vec::new())), INTERVAL);
    assert_ne!(old, new);

    sleep(INTERVAL * 3 + Duration::from_millis(10)).await;
    assert_eq!(old_calls.load(Ordering::SeqCst), 0);
    assert_eq!(new_calls.load(Ordering::SeqCst), 4);
    assert_eq!(drain(&mut events).first(), Some(&PollEvent::Stopped(old)));

    assert!(!poller.stop(old));
    assert!(poller.stop(new));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_poller_stops_ticking() {
    let calls = Arc::new(AtomicUsize::new(0));
    let poller = PollLoop::new();
    poller.start(fetcher(&calls, Ok(Vec::new())), INTERVAL);
    sleep(Duration::from_millis(10)).await;
    drop(poller);

    sleep(INTERVAL * 3).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
