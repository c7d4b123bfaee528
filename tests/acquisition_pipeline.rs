#![allow(clippy::unwrap_used, clippy::panic, missing_docs)]
//! End-to-end: mock instrument -> engine -> acquisition -> stream -> estimator.

use pressure_integrity::acquisition::{AcquisitionConfig, AcquisitionSession, StopReason};
use pressure_integrity::analysis::{LeakRateEstimator, ToleranceConfig, Verdict};
use pressure_integrity::measurement::MeasurementVectorStream;
use pressure_integrity::protocol::{cancel_pair, FramingConfig, ProtocolConfig, ProtocolEngine};
use pressure_integrity::transport::mock_serial;
use std::time::Duration;

async fn acquire(responses: Vec<String>) -> MeasurementVectorStream {
    let (port, mut instrument) = mock_serial::new();
    let engine = ProtocolEngine::new(port, ProtocolConfig::default(), FramingConfig::default());
    let (cancel, signal) = cancel_pair();

    let responder = tokio::spawn(async move {
        for response in responses {
            instrument
                .expect_and_respond(b"PA\r", response.as_bytes())
                .await;
        }
        instrument.expect_write(b"PA\r").await;
        cancel.cancel();
    });

    let config = AcquisitionConfig {
        poll_interval_ms: 5,
        ..AcquisitionConfig::default()
    };
    let session = AcquisitionSession::new(&config, Duration::from_millis(200)).unwrap();
    let mut stream = MeasurementVectorStream::new();
    let report = session.run(&engine, &mut stream, &signal).await.unwrap();
    responder.await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.samples_appended as usize, stream.len());
    stream
}

#[tokio::test]
async fn test_decaying_pressure_fails_leak_test() {
    let responses = (0..10)
        .map(|i| format!("PA,{:.1}\r", 100.0 - i as f64))
        .collect();
    let stream = acquire(responses).await;

    let tolerance = ToleranceConfig {
        max_leak_rate: 0.01,
        max_residual: 1.0e6,
        inconclusive_residual: 1.0e9,
        min_samples: 3,
    };
    let result = LeakRateEstimator::new(tolerance).evaluate(&stream.reader());
    assert_eq!(result.sample_count, 10);
    assert!(result.slope.unwrap() < 0.0);
    assert_eq!(result.verdict, Verdict::Fail);
}

#[tokio::test]
async fn test_steady_pressure_passes_leak_test() {
    let responses = (0..6).map(|_| "PA,101.325\r".to_string()).collect();
    let stream = acquire(responses).await;

    let result = LeakRateEstimator::new(ToleranceConfig::default()).evaluate(&stream.reader());
    assert_eq!(result.slope, Some(0.0));
    assert_eq!(result.verdict, Verdict::Pass);
}

#[tokio::test]
async fn test_reader_observes_appends_from_another_task() {
    let (port, mut instrument) = mock_serial::new();
    let engine = ProtocolEngine::new(port, ProtocolConfig::default(), FramingConfig::default());
    let (cancel, signal) = cancel_pair();
    let mut stream = MeasurementVectorStream::new();
    let reader = stream.reader();
    let mut updates = reader.subscribe();

    let watcher = tokio::spawn(async move {
        while *updates.borrow_and_update() < 3 {
            updates.changed().await.unwrap();
        }
        let snapshot = reader.snapshot();
        cancel.cancel();
        snapshot
    });
    let responder = tokio::spawn(async move {
        loop {
            instrument.expect_and_respond(b"PA\r", b"PA,50.0\r").await;
        }
    });

    let config = AcquisitionConfig {
        poll_interval_ms: 5,
        ..AcquisitionConfig::default()
    };
    let session = AcquisitionSession::new(&config, Duration::from_millis(200)).unwrap();
    session.run(&engine, &mut stream, &signal).await.unwrap();
    responder.abort();

    let snapshot = watcher.await.unwrap();
    assert!(snapshot.len() >= 3);
    // The snapshot is frozen even though the stream may have grown since.
    assert!(stream.len() >= snapshot.len());
    assert!(snapshot.iter().all(|s| s.pressure == 50.0));
}
