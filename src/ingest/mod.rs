//! Ingest worker: the consumer side of the listener.
//!
//! Runs on its own thread, drains listener events in FIFO order and is the
//! single writer of the registry. Structuring and merging happen here, off
//! the socket threads, so a large merge never delays the next receive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::error::{PlottrError, PlottrResult};
use crate::listener::ListenerEvent;
use crate::registry::SharedRegistry;

/// Running totals kept by the ingest worker.
#[derive(Debug, Default)]
pub struct IngestStats {
    applied: AtomicU64,
    rejected: AtomicU64,
    decode_failures: AtomicU64,
    missing_identifiers: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounts {
    /// Messages applied to the registry.
    pub applied: u64,
    /// Messages rejected by structuring or merging.
    pub rejected: u64,
    /// Payloads the listener could not decode.
    pub decode_failures: u64,
    /// Payloads without a dataset identifier.
    pub missing_identifiers: u64,
}

impl IngestStats {
    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> IngestCounts {
        IngestCounts {
            applied: self.applied.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            missing_identifiers: self.missing_identifiers.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the ingest worker thread.
#[derive(Debug)]
pub struct Ingestor {
    shutdown_tx: Option<Sender<()>>,
    stats: Arc<IngestStats>,
    join: Option<JoinHandle<()>>,
}

impl Ingestor {
    /// Start draining `events` into `registry`.
    pub fn spawn(events: Receiver<ListenerEvent>, registry: SharedRegistry) -> PlottrResult<Self> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let stats = Arc::new(IngestStats::default());

        let thread_stats = Arc::clone(&stats);
        let join = thread::Builder::new()
            .name("plottr-ingest".to_string())
            .spawn(move || worker_loop(&events, &shutdown_rx, &registry, &thread_stats))
            .map_err(|e| PlottrError::internal(format!("failed to spawn ingest worker: {e}")))?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            stats,
            join: Some(join),
        })
    }

    /// Counters so far; the worker keeps updating them.
    #[must_use]
    pub fn stats(&self) -> IngestCounts {
        self.stats.snapshot()
    }

    /// Wait until the event channel disconnects (the listener was stopped)
    /// and every queued event has been processed.
    ///
    /// Returns the final counters.
    pub fn join(mut self) -> IngestCounts {
        // Keep the shutdown sender alive so only disconnection ends the loop.
        let _shutdown = self.shutdown_tx.take();
        self.wait();
        self.stats.snapshot()
    }

    /// Process everything already queued, then stop.
    ///
    /// Returns the final counters.
    pub fn shutdown(mut self) -> IngestCounts {
        self.signal_shutdown();
        self.wait();
        self.stats.snapshot()
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }

    fn wait(&mut self) {
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                error!("ingest worker panicked");
            }
        }
    }
}

impl Drop for Ingestor {
    fn drop(&mut self) {
        self.signal_shutdown();
        self.wait();
    }
}

fn worker_loop(
    events: &Receiver<ListenerEvent>,
    shutdown_rx: &Receiver<()>,
    registry: &SharedRegistry,
    stats: &IngestStats,
) {
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => process_event(event, registry, stats),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => {
                for event in events.try_iter() {
                    process_event(event, registry, stats);
                }
                break;
            }
        }
    }
    debug!("ingest worker exiting");
}

/// Handle one listener event.
pub(crate) fn process_event(event: ListenerEvent, registry: &SharedRegistry, stats: &IngestStats) {
    match event {
        ListenerEvent::DataAvailable {
            dataset_id, message, ..
        } => match registry.apply(&dataset_id, &message, message.update) {
            Ok(change) => {
                stats.applied.fetch_add(1, Ordering::Relaxed);
                info!(
                    dataset_id = %change.dataset_id,
                    kind = ?change.kind,
                    arrays = ?change.changed_arrays,
                    revision = change.revision,
                    "dataset updated"
                );
            }
            Err(PlottrError::Schema(e)) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%dataset_id, error = %e, "message rejected");
            }
            Err(e) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                error!(%dataset_id, error = %e, "failed to apply message");
            }
        },
        ListenerEvent::DecodeFailed { .. } => {
            stats.decode_failures.fetch_add(1, Ordering::Relaxed);
        }
        ListenerEvent::MissingIdentifier { .. } => {
            stats.missing_identifiers.fetch_add(1, Ordering::Relaxed);
        }
        other => debug!(event = %other.describe(), "listener event"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::time::Duration;

    use chrono::Utc;
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::wire::{ArrayDescriptor, WireMessage};

    fn data_event(id: &str, update: bool, x: i64, v: f64) -> ListenerEvent {
        let message = WireMessage {
            id: id.to_string(),
            update,
            datasets: Some(BTreeMap::from([
                ("x".to_string(), ArrayDescriptor::axis([x])),
                ("v".to_string(), ArrayDescriptor::data([v], ["x"])),
            ])),
        };
        ListenerEvent::DataAvailable {
            dataset_id: id.to_string(),
            message,
            received_at: Utc::now(),
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    #[test]
    fn applies_events_in_order_and_counts() {
        let registry = SharedRegistry::default();
        let (tx, rx) = unbounded();
        let ingestor = Ingestor::spawn(rx, registry.clone()).unwrap();

        tx.send(data_event("A", false, 1, 1.0)).unwrap();
        tx.send(data_event("A", true, 2, 2.0)).unwrap();
        tx.send(data_event("A", true, 2, 3.0)).unwrap();
        tx.send(ListenerEvent::MissingIdentifier { peer: peer() }).unwrap();
        tx.send(ListenerEvent::DecodeFailed {
            peer: peer(),
            error: "bad".to_string(),
        })
        .unwrap();
        drop(tx);
        let stats = ingestor.join();

        assert_eq!(
            stats,
            IngestCounts {
                applied: 3,
                rejected: 0,
                decode_failures: 1,
                missing_identifiers: 1,
            }
        );
        let ds = registry.get_structured_dataset("A", "v").unwrap().unwrap();
        assert_eq!(ds.point_count(), 2);
        assert_eq!(
            ds.get(&[crate::scalar::Scalar::Int(2)]),
            Some(&crate::scalar::Scalar::Float(3.0))
        );
    }

    #[test]
    fn rejected_messages_are_counted_and_skipped() {
        let registry = SharedRegistry::default();
        let stats = IngestStats::default();

        let mut bad = data_event("A", false, 1, 1.0);
        if let ListenerEvent::DataAvailable { message, .. } = &mut bad {
            message.datasets.as_mut().unwrap().remove("x");
        }
        process_event(bad, &registry, &stats);
        process_event(data_event("A", false, 1, 1.0), &registry, &stats);

        let counts = stats.snapshot();
        assert_eq!(counts.rejected, 1);
        assert_eq!(counts.applied, 1);
    }

    #[test]
    fn shutdown_drains_queued_events() {
        let registry = SharedRegistry::default();
        let changes = registry.subscribe();
        let (tx, rx) = unbounded();

        for i in 0..50 {
            tx.send(data_event("A", true, i, 0.0)).unwrap();
        }
        let ingestor = Ingestor::spawn(rx, registry.clone()).unwrap();
        assert_eq!(ingestor.shutdown().applied, 50);

        assert_eq!(
            registry.get_structured_dataset("A", "v").unwrap().unwrap().point_count(),
            50
        );
        let first = changes.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(first.revision, 1);
    }
}
