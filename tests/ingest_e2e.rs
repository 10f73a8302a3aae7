use std::time::Duration;

use plottr::listener::{Listener, ListenerConfig, ListenerHandle};
use plottr::registry::{ChangeKind, ChangeStream, RegistryChange, SharedRegistry};
use plottr::{DataSender, Ingestor, MessageBuilder, Scalar, WireMessage};

struct Harness {
    handle: ListenerHandle,
    ingestor: Ingestor,
    registry: SharedRegistry,
    changes: ChangeStream,
}

fn start() -> Harness {
    let listener = Listener::bind(ListenerConfig {
        addr: "127.0.0.1:0".parse().unwrap(),
        poll_interval: Duration::from_millis(10),
        ..ListenerConfig::default()
    })
    .unwrap();

    let registry = SharedRegistry::default();
    let changes = registry.subscribe();
    let ingestor = Ingestor::spawn(listener.events(), registry.clone()).unwrap();
    let handle = listener.start().unwrap();

    Harness {
        handle,
        ingestor,
        registry,
        changes,
    }
}

fn next_change(changes: &ChangeStream) -> RegistryChange {
    changes
        .recv_timeout(Duration::from_secs(5))
        .unwrap()
        .expect("timed out waiting for registry change")
}

fn scan(id: &str, update: bool, xs: &[i64], vs: &[f64]) -> WireMessage {
    MessageBuilder::new(id)
        .update(update)
        .axis("x", xs.to_vec())
        .data("v", vs.to_vec(), ["x"])
        .build()
        .unwrap()
}

#[test]
fn update_merges_and_resend_replaces() {
    let h = start();
    let mut sender = DataSender::connect(h.handle.local_addr()).unwrap();

    sender.send(&scan("A", false, &[0, 1], &[1.0, 2.0])).unwrap();
    assert_eq!(next_change(&h.changes).kind, ChangeKind::Created);

    sender.send(&scan("A", true, &[1, 2], &[20.0, 30.0])).unwrap();
    let merged = next_change(&h.changes);
    assert_eq!(merged.kind, ChangeKind::Merged);
    assert_eq!(merged.shape[0].points, 3);

    let ds = h.registry.get_structured_dataset("A", "v").unwrap().unwrap();
    assert_eq!(ds.get(&[Scalar::Int(1)]), Some(&Scalar::Float(20.0)));
    assert_eq!(ds.get(&[Scalar::Int(0)]), Some(&Scalar::Float(1.0)));

    sender.send(&scan("A", false, &[7], &[7.0])).unwrap();
    assert_eq!(next_change(&h.changes).kind, ChangeKind::Replaced);
    let ds = h.registry.get_structured_dataset("A", "v").unwrap().unwrap();
    assert_eq!(ds.point_count(), 1);
    assert_eq!(ds.get(&[Scalar::Int(7)]), Some(&Scalar::Float(7.0)));
}

#[test]
fn malformed_and_anonymous_payloads_are_dropped() {
    let h = start();
    let mut sender = DataSender::connect(h.handle.local_addr()).unwrap();

    sender.send_raw(b"{not json").unwrap();
    sender.send_raw(br#"{"update": true, "datasets": {}}"#).unwrap();
    sender.send_raw(br#"{"id": "A", "datasets": {"v": {"values": [null]}}}"#).unwrap();
    sender.send(&scan("A", false, &[0], &[1.0])).unwrap();

    let change = next_change(&h.changes);
    assert_eq!(change.dataset_id, "A");
    assert_eq!(change.revision, 1);

    // Counters for earlier events are final once a later event was applied.
    let counts = h.ingestor.stats();
    assert_eq!(counts.decode_failures, 2);
    assert_eq!(counts.missing_identifiers, 1);
}

#[test]
fn schema_errors_do_not_stop_ingestion() {
    let h = start();
    let mut sender = DataSender::connect(h.handle.local_addr()).unwrap();

    sender
        .send_raw(br#"{"id": "A", "datasets": {"x": {"values": [0, 1, 2]}, "y": {"values": [0, 1, 2, 3]}, "v": {"values": [1, 2, 3], "axes": ["x", "y"]}}}"#)
        .unwrap();
    sender.send(&scan("B", false, &[0], &[1.0])).unwrap();

    assert_eq!(next_change(&h.changes).dataset_id, "B");
    assert!(h.registry.entry("A").unwrap().is_none());
    assert_eq!(h.ingestor.stats().rejected, 1);
}

#[test]
fn one_producer_is_applied_in_send_order() {
    let h = start();
    let mut sender = DataSender::connect(h.handle.local_addr()).unwrap();

    for i in 0..100 {
        sender.send(&scan("A", true, &[0], &[f64::from(i)])).unwrap();
    }

    let mut last = 0;
    for _ in 0..100 {
        let change = next_change(&h.changes);
        assert_eq!(change.revision, last + 1);
        last = change.revision;
    }
    let ds = h.registry.get_structured_dataset("A", "v").unwrap().unwrap();
    assert_eq!(ds.point_count(), 1);
    assert_eq!(ds.get(&[Scalar::Int(0)]), Some(&Scalar::Float(99.0)));
}

#[test]
fn concurrent_producers_each_get_their_dataset() {
    let h = start();
    let addr = h.handle.local_addr();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            std::thread::spawn(move || {
                let mut sender = DataSender::connect(addr).unwrap();
                let id = format!("producer-{p}");
                for i in 0..10 {
                    sender.send(&scan(&id, true, &[i], &[1.0])).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    for _ in 0..40 {
        next_change(&h.changes);
    }
    let ids = h.registry.dataset_ids().unwrap();
    assert_eq!(ids.len(), 4);
    for id in ids {
        assert_eq!(h.registry.get_structured_dataset(&id, "v").unwrap().unwrap().point_count(), 10);
    }
}

#[test]
fn stopping_listener_lets_ingestor_finish() {
    let Harness {
        mut handle,
        ingestor,
        registry,
        changes,
    } = start();
    let mut sender = DataSender::connect(handle.local_addr()).unwrap();
    sender.send(&scan("A", false, &[0], &[1.0])).unwrap();
    next_change(&changes);

    handle.stop();
    drop(handle);
    let counts = ingestor.join();

    assert_eq!(counts.applied, 1);
    assert!(registry.entry("A").unwrap().is_some());
}
