//! Tests for the worker pool.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::*;
use crate::error::Error;

fn archives(n: usize) -> ArchiveSet {
    let base: DateTime<Utc> = "2019-06-01T00:00:00Z".parse().unwrap();
    (0..n)
        .map(|i| {
            let start = base + TimeDelta::hours(i as i64);
            ArchiveDescriptor::new(
                format!("{i:02}.tsv.gz"),
                100u64,
                start,
                start + TimeDelta::minutes(59),
                format!("https://x/{i:02}"),
            )
        })
        .collect()
}

fn dispatcher(workers: usize) -> (Dispatcher, broadcast::Receiver<Event>) {
    let (tx, rx) = broadcast::channel(1000);
    (Dispatcher::new(workers, tx), rx)
}

fn report(archive: &ArchiveDescriptor) -> FetchReport {
    FetchReport {
        name: archive.filename.clone(),
        path: PathBuf::from("/out").join(&archive.filename),
        bytes_written: 1,
    }
}

fn ok(archive: &ArchiveDescriptor) -> Result<FetchReport> {
    Ok(report(archive))
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_archive_is_fetched_exactly_once() {
    let (pool, _rx) = dispatcher(4);
    let visits: Arc<StdMutex<HashMap<String, usize>>> = Arc::default();

    let seen = Arc::clone(&visits);
    let summary = pool
        .run(archives(20), move |archive| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                *seen
                    .lock()
                    .unwrap()
                    .entry(archive.filename.clone())
                    .or_default() += 1;
                ok(&archive)
            }
        })
        .await;

    assert_eq!(summary.workers, 4);
    assert_eq!(summary.dispatched, 20);
    assert_eq!(summary.succeeded, 20);
    assert_eq!(summary.failed, 0);

    let visits = visits.lock().unwrap();
    assert_eq!(visits.len(), 20);
    assert!(visits.values().all(|&n| n == 1), "{visits:?}");
}

#[tokio::test]
async fn worker_count_is_clamped_to_selection_size() {
    let (pool, mut rx) = dispatcher(10);
    assert_eq!(pool.worker_count_for(3), 3);

    let summary = pool
        .run(archives(3), |archive| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ok(&archive)
        })
        .await;

    assert_eq!(summary.workers, 3);
    assert_eq!(summary.succeeded, 3);

    let workers: HashSet<usize> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::ArchiveStarted { worker, .. } => Some(worker),
            _ => None,
        })
        .collect();
    assert!(workers.iter().all(|w| *w < 3), "{workers:?}");
}

#[tokio::test]
async fn in_flight_fetches_never_exceed_worker_count() {
    let (pool, _rx) = dispatcher(3);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (now, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
    let summary = pool
        .run(archives(9), move |archive| {
            let (now, max) = (Arc::clone(&now), Arc::clone(&max));
            async move {
                let current = now.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                now.fetch_sub(1, Ordering::SeqCst);
                ok(&archive)
            }
        })
        .await;

    assert_eq!(summary.succeeded, 9);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failures_do_not_cancel_siblings() {
    let (pool, mut rx) = dispatcher(2);
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&attempts);
    let summary = pool
        .run(archives(6), move |archive| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let index: usize = archive.filename[..2].parse().unwrap();
                if index % 2 == 1 {
                    Err(Error::Transport {
                        status: Some(500),
                        message: format!("http status: 500 {}", archive.download_url()),
                    })
                } else {
                    ok(&archive)
                }
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 6);
    assert_eq!(summary.dispatched, 6);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 3);

    let mut failed: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::ArchiveFailed { name, error, .. } => {
                assert!(error.contains("500"));
                Some(name)
            }
            _ => None,
        })
        .collect();
    failed.sort();
    assert_eq!(failed, ["01.tsv.gz", "03.tsv.gz", "05.tsv.gz"]);
}

#[tokio::test]
async fn single_worker_consumes_in_submission_order() {
    let (pool, _rx) = dispatcher(1);
    let order: Arc<StdMutex<Vec<String>>> = Arc::default();

    let seen = Arc::clone(&order);
    pool.run(archives(5), move |archive| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(archive.filename.clone());
            ok(&archive)
        }
    })
    .await;

    assert_eq!(
        *order.lock().unwrap(),
        ["00.tsv.gz", "01.tsv.gz", "02.tsv.gz", "03.tsv.gz", "04.tsv.gz"]
    );
}

#[tokio::test]
async fn empty_selection_spawns_no_workers() {
    let (pool, mut rx) = dispatcher(4);
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let summary = pool
        .run(ArchiveSet::new(), move |archive| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { ok(&archive) }
        })
        .await;

    assert_eq!(summary, RunSummary::default());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::RunFinished { .. }));
}

#[tokio::test]
async fn events_report_each_archive_then_finish() {
    let (pool, mut rx) = dispatcher(2);

    pool.run(archives(4), |archive| async move { ok(&archive) })
        .await;

    let events = drain(&mut rx);
    let started = events
        .iter()
        .filter(|e| matches!(e, Event::ArchiveStarted { .. }))
        .count();
    let complete = events
        .iter()
        .filter(|e| matches!(e, Event::ArchiveComplete { .. }))
        .count();
    assert_eq!(started, 4);
    assert_eq!(complete, 4);

    match events.last() {
        Some(Event::RunFinished { summary }) => {
            assert_eq!(summary.dispatched, 4);
            assert_eq!(summary.succeeded, 4);
        }
        other => panic!("expected RunFinished last, got {other:?}"),
    }
}

#[tokio::test]
async fn panicking_fetch_is_counted_as_failed() {
    let (pool, mut rx) = dispatcher(2);

    let summary = pool
        .run(archives(4), |archive| async move {
            if archive.filename.starts_with("00") {
                panic!("boom");
            }
            ok(&archive)
        })
        .await;

    assert_eq!(summary.workers, 2);
    assert_eq!(summary.dispatched, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);

    let events = drain(&mut rx);
    let outcomes: Vec<&Event> = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::ArchiveComplete { .. } | Event::ArchiveFailed { .. }
            )
        })
        .collect();
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().any(|e| matches!(
        e,
        Event::ArchiveFailed { name, error, .. }
            if name == "00.tsv.gz" && error.contains("panicked") && error.contains("boom")
    )));
}

#[tokio::test]
async fn lone_worker_survives_a_panicking_fetch() {
    let (pool, mut rx) = dispatcher(1);

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        pool.run(archives(3), |archive| async move {
            if archive.filename.starts_with("00") {
                panic!("first archive {}", archive.filename);
            }
            ok(&archive)
        }),
    )
    .await
    .expect("run must finish after a panic");

    assert_eq!(summary.workers, 1);
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let failed: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::ArchiveFailed { name, error, .. } => {
                assert!(error.contains("first archive 00.tsv.gz"), "{error}");
                Some(name)
            }
            _ => None,
        })
        .collect();
    assert_eq!(failed, ["00.tsv.gz"]);
}

#[tokio::test]
async fn synchronous_panic_in_fetch_is_contained() {
    let (pool, _rx) = dispatcher(1);

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        pool.run(archives(2), |archive| {
            assert!(!archive.filename.starts_with("01"), "rejected up front");
            async move { ok(&archive) }
        }),
    )
    .await
    .expect("run must finish after a panic");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn event_sink_receives_every_event_despite_tiny_broadcast() {
    let (tx, _lagging) = broadcast::channel(1);
    let (sink, mut events) = mpsc::unbounded_channel();
    let pool = Dispatcher::new(3, tx).with_event_sink(sink);

    let summary = pool
        .run(archives(8), |archive| async move {
            if archive.filename.starts_with("07") {
                return Err(Error::Format("not gzip".into()));
            }
            ok(&archive)
        })
        .await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    let started = received
        .iter()
        .filter(|e| matches!(e, Event::ArchiveStarted { .. }))
        .count();
    let complete = received
        .iter()
        .filter(|e| matches!(e, Event::ArchiveComplete { .. }))
        .count();
    let failed = received
        .iter()
        .filter(|e| matches!(e, Event::ArchiveFailed { .. }))
        .count();
    assert_eq!((started, complete, failed), (8, 7, 1));
    assert!(matches!(
        received.last(),
        Some(Event::RunFinished { summary: s }) if *s == summary
    ));
}
