//! Bounded worker pool draining the selected archives.
//!
//! The pool is a fixed set of long-lived tasks pulling from one shared queue:
//! the producer pushes every selected archive in order and then drops the
//! sender, which is the only signal that tells workers to exit. Completion
//! order across archives is unspecified.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::types::{ArchiveDescriptor, ArchiveSet, Event, FetchReport, RunSummary};

/// Per-worker success/failure counts
#[derive(Debug, Default, Clone, Copy)]
struct WorkerTally {
    succeeded: usize,
    failed: usize,
}

/// Where run events go
///
/// The broadcast channel is lossy for slow subscribers; the optional sink is
/// unbounded and receives every event.
#[derive(Clone)]
struct Emitter {
    event_tx: broadcast::Sender<Event>,
    sink: Option<mpsc::UnboundedSender<Event>>,
}

impl Emitter {
    fn emit(&self, event: Event) {
        if let Some(sink) = &self.sink {
            sink.send(event.clone()).ok();
        }
        self.event_tx.send(event).ok();
    }
}

/// Fans archives out to a bounded number of workers
#[derive(Clone)]
pub struct Dispatcher {
    workers: usize,
    emitter: Emitter,
}

impl Dispatcher {
    /// Pool of at most `workers` workers reporting on `event_tx`
    pub fn new(workers: usize, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            workers,
            emitter: Emitter {
                event_tx,
                sink: None,
            },
        }
    }

    /// Also deliver every event, without loss, to `sink`
    #[must_use]
    pub fn with_event_sink(mut self, sink: mpsc::UnboundedSender<Event>) -> Self {
        self.emitter.sink = Some(sink);
        self
    }

    /// Workers spawned for a selection of `archives` archives
    ///
    /// Never more workers than archives, so none can sit idle forever.
    pub fn worker_count_for(&self, archives: usize) -> usize {
        self.workers.min(archives)
    }

    /// Hand every archive in `selected` to exactly one worker and wait for
    /// all workers to exit
    ///
    /// `fetch` is invoked once per archive. A failing or panicking fetch is
    /// logged, broadcast as [`Event::ArchiveFailed`], and the worker moves on
    /// to the next queued archive; siblings are never cancelled. Every
    /// archive ends up counted as either succeeded or failed. The returned
    /// summary carries counts only.
    pub async fn run<F, Fut>(&self, selected: ArchiveSet, fetch: F) -> RunSummary
    where
        F: Fn(Arc<ArchiveDescriptor>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FetchReport>> + Send + 'static,
    {
        let workers = self.worker_count_for(selected.len());
        let mut summary = RunSummary {
            workers,
            ..RunSummary::default()
        };

        if workers == 0 {
            tracing::debug!("No archives selected, nothing to dispatch");
            self.emitter.emit(Event::RunFinished { summary });
            return summary;
        }

        let (tx, rx) = mpsc::channel::<Arc<ArchiveDescriptor>>(1);
        let rx = Arc::new(Mutex::new(rx));
        let fetch = Arc::new(fetch);

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let rx = Arc::clone(&rx);
            let fetch = Arc::clone(&fetch);
            let emitter = self.emitter.clone();

            pool.spawn(async move {
                let mut tally = WorkerTally::default();

                loop {
                    let next = {
                        let mut queue = rx.lock().await;
                        queue.recv().await
                    };
                    let Some(archive) = next else {
                        break;
                    };

                    let name = archive.filename.clone();
                    emitter.emit(Event::ArchiveStarted {
                        worker,
                        name: name.clone(),
                    });

                    let outcome = AssertUnwindSafe(async { (*fetch)(archive).await })
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(panic_error(panic)));

                    match outcome {
                        Ok(report) => {
                            tracing::info!(
                                worker,
                                archive = %name,
                                path = %report.path.display(),
                                bytes = report.bytes_written,
                                "Archive saved"
                            );
                            tally.succeeded += 1;
                            emitter.emit(Event::ArchiveComplete {
                                worker,
                                name,
                                path: report.path,
                                bytes_written: report.bytes_written,
                            });
                        }
                        Err(e) => {
                            tracing::warn!(worker, archive = %name, error = %e, "Archive failed");
                            tally.failed += 1;
                            emitter.emit(Event::ArchiveFailed {
                                worker,
                                name,
                                error: e.to_string(),
                            });
                        }
                    }
                }

                tracing::debug!(
                    worker,
                    succeeded = tally.succeeded,
                    failed = tally.failed,
                    "Worker drained queue"
                );
                tally
            });
        }
        // Workers own the only receivers, so sending fails once all have exited.
        drop(rx);

        let mut queue = selected.into_iter();
        while let Some(archive) = queue.next() {
            if let Err(SendError(archive)) = tx.send(archive).await {
                tracing::error!("All workers exited before the queue was drained");
                for undelivered in std::iter::once(archive).chain(queue.by_ref()) {
                    summary.failed += 1;
                    self.emitter.emit(Event::ArchiveFailed {
                        worker: workers,
                        name: undelivered.filename.clone(),
                        error: Error::Task("no worker left to fetch archive".into())
                            .to_string(),
                    });
                }
                break;
            }
            summary.dispatched += 1;
        }
        drop(tx);

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(tally) => {
                    summary.succeeded += tally.succeeded;
                    summary.failed += tally.failed;
                }
                Err(e) => tracing::error!(error = %e, "Worker task ended abnormally"),
            }
        }

        tracing::info!(
            workers = summary.workers,
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Run finished"
        );
        self.emitter.emit(Event::RunFinished { summary });
        summary
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    Error::Task(format!("fetch panicked: {}", message))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
