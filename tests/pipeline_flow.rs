//! Pipeline End-to-End Tests
//!
//! Drives the spawned actor set through its channels with an in-test
//! downstream tier.
//!
//! Covers:
//! - Every raw record and every row tuple is acknowledged
//! - Closing the input drains each accumulator through a completed epoch
//! - Downstream data routing by (column·31 + salt) mod P
//! - Shutdown when no downstream instance can answer
//! - Session-end channel closing while an epoch is buffering

use std::sync::Arc;

use std::time::Duration;

use num_bigint::BigUint;
use pirstream::accumulator::{
    downstream_slot, AccumulatorSettings, AccumulatorState, AccumulatorTask, DownstreamOutputs,
    ModPowEncryptor, RowAccumulator,
};
use pirstream::config::ResponderConfig;
use pirstream::observability::MetricsRegistry;
use pirstream::pipeline::{DownstreamPort, Pipeline, SessionEndRouter};
use pirstream::query::QueryContext;
use pirstream::stream::{Delivery, DeliveryTag, MatrixElement, RowTuple, SessionEnd};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio::task::JoinHandle;

// =============================================================================
// Test Utilities
// =============================================================================

fn config_json(instances: u32, parallelism: u32, salt: bool) -> String {
    format!(
        r#"{{
            "timeToFlush": 3600,
            "downstreamParallelism": {parallelism},
            "accumulatorInstances": {instances},
            "saltColumns": {salt},
            "rowDivisions": 3,
            "ackDeadline": null,
            "logLevel": "warn",
            "query": {{
                "hashKey": "pipeline",
                "hashBitSize": 2,
                "selectorField": "sel",
                "dataFields": ["payload"],
                "modulus": "35",
                "queryElements": ["2", "3", "4", "6"]
            }}
        }}"#
    )
}

fn setup(instances: u32, parallelism: u32, salt: bool) -> (ResponderConfig, Arc<QueryContext>) {
    let config = ResponderConfig::from_json_str(&config_json(instances, parallelism, salt))
        .expect("valid config");
    let context = Arc::new(QueryContext::build(&config.query).expect("valid query"));
    (config, context)
}

/// Downstream stand-in: collects data, answers every flush signal after
/// draining the data that arrived before it.
fn spawn_downstream(
    mut port: DownstreamPort,
    router: SessionEndRouter,
) -> JoinHandle<(u32, Vec<MatrixElement>)> {
    tokio::spawn(async move {
        let mut received = Vec::new();
        let mut data_open = true;
        loop {
            tokio::select! {
                biased;
                element = port.data.recv(), if data_open => match element {
                    Some(element) => received.push(element),
                    None => data_open = false,
                },
                flush = port.flushes.recv() => match flush {
                    Ok(signal) => {
                        router
                            .deliver(SessionEnd::answering(signal, port.index))
                            .expect("accumulator alive while flushing");
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }
        (port.index, received)
    })
}

async fn drain_tags(mut rx: UnboundedReceiver<DeliveryTag>) -> Vec<DeliveryTag> {
    let mut tags = Vec::new();
    while let Some(tag) = rx.recv().await {
        tags.push(tag);
    }
    tags.sort_unstable();
    tags
}

fn record(i: usize) -> String {
    format!(r#"{{"sel": "user-{}", "payload": "abc"}}"#, i)
}

// =============================================================================
// Drain On Shutdown
// =============================================================================

/// All output reaches downstream and every accumulator ends Normal.
#[tokio::test]
async fn test_drain_delivers_everything() {
    let (config, context) = setup(2, 3, false);
    let metrics = Arc::new(MetricsRegistry::new());
    let (pipeline, handles) =
        Pipeline::spawn(&config, context, Arc::new(ModPowEncryptor), Arc::clone(&metrics));
    assert_eq!(pipeline.accumulator_count(), 2);

    let downstream: Vec<_> = handles
        .downstream
        .into_iter()
        .map(|port| spawn_downstream(port, handles.session_ends.clone()))
        .collect();
    drop(handles.session_ends);

    for i in 0..12 {
        handles.records.submit(record(i)).unwrap();
    }
    handles.records.submit("garbage").unwrap();
    drop(handles.records);

    let finished = pipeline.join().await.unwrap();
    assert_eq!(finished.len(), 2);
    for acc in &finished {
        assert_eq!(acc.state(), AccumulatorState::Normal);
        assert_eq!(acc.buffered_len(), 0);
        assert!(!acc.has_unflushed_output());
    }

    let mut total = 0;
    for handle in downstream {
        let (index, received) = handle.await.unwrap();
        for element in &received {
            assert_eq!(downstream_slot(element, 3), index as usize);
            assert!(element.salt.is_none());
        }
        total += received.len();
    }
    // 12 valid records × 3 one-byte partitions
    assert_eq!(total, 36);

    assert_eq!(drain_tags(handles.record_acks).await, (0..13).collect::<Vec<_>>());
    let tuple_acks = drain_tags(handles.tuple_acks).await;
    assert_eq!(tuple_acks.len(), 12);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.records_received, 13);
    assert_eq!(snapshot.records_unparseable, 1);
    assert_eq!(snapshot.elements_emitted, 36);
    assert_eq!(snapshot.epochs_abandoned, 0);
    assert!(snapshot.epochs_released >= snapshot.epochs_opened);
}

/// With split partitions every element still arrives, salted in range.
#[tokio::test]
async fn test_split_and_salted_run() {
    let (mut config, context) = setup(1, 2, true);
    config.split_partitions = true;
    let metrics = Arc::new(MetricsRegistry::new());
    let (pipeline, handles) =
        Pipeline::spawn(&config, context, Arc::new(ModPowEncryptor), Arc::clone(&metrics));

    let downstream: Vec<_> = handles
        .downstream
        .into_iter()
        .map(|port| spawn_downstream(port, handles.session_ends.clone()))
        .collect();
    drop(handles.session_ends);

    for i in 0..5 {
        handles.records.submit(record(i)).unwrap();
    }
    drop(handles.records);
    pipeline.join().await.unwrap();

    let mut total = 0;
    for handle in downstream {
        let (index, received) = handle.await.unwrap();
        for element in &received {
            assert!(matches!(element.salt, Some(s) if s < 3));
            assert_eq!(downstream_slot(element, 2), index as usize);
        }
        total += received.len();
    }
    assert_eq!(total, 15);
    assert_eq!(metrics.snapshot().row_tuples_emitted, 15);
    let snapshot = metrics.snapshot();
    let session_acks = drain_tags(handles.session_end_acks).await;
    assert_eq!(
        session_acks.len() as u64,
        snapshot.session_ends_accepted + snapshot.session_ends_ignored
    );
}

/// An idle pipeline shuts down without opening any epoch.
#[tokio::test]
async fn test_idle_pipeline_exits() {
    let (config, context) = setup(2, 2, false);
    let metrics = Arc::new(MetricsRegistry::new());
    let (pipeline, handles) =
        Pipeline::spawn(&config, context, Arc::new(ModPowEncryptor), Arc::clone(&metrics));

    drop(handles.records);
    pipeline.join().await.unwrap();

    assert_eq!(metrics.snapshot().epochs_opened, 0);
}

/// Session-ends naming an unknown source are rejected by the router.
#[tokio::test]
async fn test_router_rejects_unknown_source() {
    let (config, context) = setup(1, 1, false);
    let (pipeline, handles) = Pipeline::spawn(
        &config,
        context,
        Arc::new(ModPowEncryptor),
        Arc::new(MetricsRegistry::new()),
    );

    let stray = SessionEnd {
        source: 3,
        epoch: 1,
        downstream: 0,
    };
    assert!(handles.session_ends.deliver(stray).is_err());

    drop(handles.records);
    pipeline.join().await.unwrap();
}

// =============================================================================
// Missing Downstream
// =============================================================================

/// With nobody able to answer, the drain releases its buffer and stops.
#[tokio::test]
async fn test_drain_without_session_ends_releases_and_exits() {
    let (config, context) = setup(1, 2, false);
    let metrics = Arc::new(MetricsRegistry::new());
    let (pipeline, handles) =
        Pipeline::spawn(&config, context, Arc::new(ModPowEncryptor), Arc::clone(&metrics));

    let mut ports = handles.downstream;
    drop(handles.session_ends);

    for i in 0..4 {
        handles.records.submit(record(i)).unwrap();
    }
    drop(handles.records);
    pipeline.join().await.unwrap();

    let mut total = 0;
    for port in ports.iter_mut() {
        while port.data.try_recv().is_ok() {
            total += 1;
        }
    }
    assert_eq!(total, 12);
    assert_eq!(metrics.snapshot().epochs_released, 0);
    assert_eq!(metrics.snapshot().epochs_abandoned, 1);
}

/// Session-ends stop arriving mid-run: held output is released without
/// waiting for input to close, and later data still flows.
#[tokio::test]
async fn test_session_channel_closed_while_buffering() {
    let (_, context) = setup(1, 2, false);
    let metrics = Arc::new(MetricsRegistry::new());
    let accumulator = RowAccumulator::new(
        0,
        AccumulatorSettings::new(2),
        context,
        Arc::new(ModPowEncryptor),
        Arc::clone(&metrics),
    );

    let (data_tx, data_rx) = mpsc::unbounded_channel();
    let (session_tx, session_rx) = mpsc::unbounded_channel::<Delivery<SessionEnd>>();
    let (tuple_ack_tx, mut tuple_ack_rx) = mpsc::unbounded_channel();
    let (session_ack_tx, mut session_ack_rx) = mpsc::unbounded_channel();
    let (flush_tx, mut flush_rx) = broadcast::channel(16);
    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    let (b_tx, mut b_rx) = mpsc::unbounded_channel();

    let outputs = DownstreamOutputs::new(
        vec![a_tx, b_tx],
        flush_tx,
        tuple_ack_tx,
        session_ack_tx,
        Arc::clone(&metrics),
    );
    let task = AccumulatorTask::new(
        accumulator,
        data_rx,
        session_rx,
        outputs,
        Duration::from_millis(20),
    );
    let handle = tokio::spawn(task.run());

    let signal = timeout(Duration::from_secs(5), flush_rx.recv())
        .await
        .expect("flush within deadline")
        .expect("flush channel open");
    assert_eq!(signal.epoch, 1);

    let tuple = |row: u32| RowTuple::new(row, vec![BigUint::from(1u32), BigUint::from(2u32)]);
    data_tx.send(Delivery::new(0, tuple(1))).unwrap();
    assert_eq!(tuple_ack_rx.recv().await, Some(0));
    assert!(a_rx.try_recv().is_err());
    assert!(b_rx.try_recv().is_err());

    drop(session_tx);

    // Released without closing the data inbox.
    let mut received = 0;
    while received < 2 {
        let element = timeout(Duration::from_secs(5), async {
            tokio::select! {
                Some(e) = a_rx.recv() => e,
                Some(e) = b_rx.recv() => e,
            }
        })
        .await
        .expect("buffered output released");
        assert_eq!(element.salt, None);
        received += 1;
    }

    data_tx.send(Delivery::new(1, tuple(2))).unwrap();
    assert_eq!(tuple_ack_rx.recv().await, Some(1));
    drop(data_tx);

    let finished = handle.await.unwrap();
    assert_eq!(finished.state(), AccumulatorState::Normal);
    assert_eq!(finished.buffered_len(), 0);

    while a_rx.try_recv().is_ok() {
        received += 1;
    }
    while b_rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 4);
    assert!(session_ack_rx.try_recv().is_err());

    let snapshot = metrics.snapshot();
    assert!(snapshot.epochs_abandoned >= 1);
    assert_eq!(snapshot.epochs_released, 0);
    assert_eq!(snapshot.elements_emitted, 4);
}
