mod support;

use dupgate_detector::{
    DetectorConfig, DetectorError, DuplicateDetector, UnavailabilityPolicy, VerdictReason,
};
use dupgate_vector_store::{LocalVectorStore, VectorStoreError};
use pretty_assertions::assert_eq;
use std::time::Duration;
use support::{python, CountingEmbedder, InstrumentedStore, ScriptedEmbedder, SUM_TOTAL};

fn config(policy: UnavailabilityPolicy) -> DetectorConfig {
    DetectorConfig {
        unavailability_policy: policy,
        dimensionality: 384,
        ..DetectorConfig::default()
    }
}

#[tokio::test]
async fn fail_open_store_outage_allows() {
    let (store, switches) = InstrumentedStore::new();
    let detector = DuplicateDetector::connect(
        config(UnavailabilityPolicy::FailOpen),
        CountingEmbedder::new(384),
        &store,
    )
    .await
    .unwrap();
    switches.set_offline(true);

    let fragment = python(&detector, SUM_TOTAL, "a.py", "sum_total");
    let verdict = detector.check(&fragment).await.unwrap();

    assert!(!verdict.is_duplicate);
    assert_eq!(verdict.reason, VerdictReason::StoreUnavailable);
    assert!(!verdict.indexed);
    assert!(verdict.detail.unwrap().contains("injected outage"));
}

#[tokio::test]
async fn fail_closed_store_outage_blocks() {
    let (store, switches) = InstrumentedStore::new();
    let detector = DuplicateDetector::connect(
        config(UnavailabilityPolicy::FailClosed),
        CountingEmbedder::new(384),
        &store,
    )
    .await
    .unwrap();
    switches.set_offline(true);

    let fragment = python(&detector, SUM_TOTAL, "a.py", "sum_total");
    let verdict = detector.check(&fragment).await.unwrap();

    assert!(verdict.is_duplicate);
    assert_eq!(verdict.reason, VerdictReason::StoreUnavailable);
    assert!(verdict.best_match.is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_embedder_times_out_as_unavailable() {
    let store = LocalVectorStore::in_memory();
    let detector = DuplicateDetector::connect(
        DetectorConfig {
            embed_timeout_ms: 50,
            ..config(UnavailabilityPolicy::FailOpen)
        },
        CountingEmbedder::slow(384, Duration::from_secs(30)),
        &store,
    )
    .await
    .unwrap();

    let fragment = python(&detector, SUM_TOTAL, "a.py", "sum_total");
    let verdict = detector.check(&fragment).await.unwrap();

    assert!(!verdict.is_duplicate);
    assert_eq!(verdict.reason, VerdictReason::StoreUnavailable);
    let detail = verdict.detail.unwrap();
    assert!(detail.contains("embed timed out after 50 ms"), "{detail}");
}

#[tokio::test]
async fn unreachable_model_follows_policy() {
    let store = LocalVectorStore::in_memory();
    let detector = DuplicateDetector::connect(
        DetectorConfig {
            dimensionality: 2,
            minimum_fragment_size: 0,
            ..config(UnavailabilityPolicy::FailClosed)
        },
        ScriptedEmbedder::new(2, &[]),
        &store,
    )
    .await
    .unwrap();

    let fragment = python(&detector, "unknown_text()", "a.py", "f");
    let verdict = detector.check(&fragment).await.unwrap();
    assert!(verdict.is_duplicate);
    assert_eq!(verdict.reason, VerdictReason::StoreUnavailable);
    assert!(verdict.detail.unwrap().contains("Embedding model unavailable"));
}

#[tokio::test]
async fn failed_indexing_keeps_the_verdict() {
    let (store, switches) = InstrumentedStore::new();
    let detector = DuplicateDetector::connect(
        config(UnavailabilityPolicy::FailOpen),
        CountingEmbedder::new(384),
        &store,
    )
    .await
    .unwrap();
    switches.set_fail_writes(true);

    let fragment = python(&detector, SUM_TOTAL, "a.py", "sum_total");
    let verdict = detector.check(&fragment).await.unwrap();

    assert!(!verdict.is_duplicate);
    assert_eq!(verdict.reason, VerdictReason::BelowThreshold);
    assert!(!verdict.indexed);
}

#[tokio::test]
async fn wrong_vector_width_is_fatal() {
    let store = LocalVectorStore::in_memory();
    let detector = DuplicateDetector::connect(
        DetectorConfig {
            dimensionality: 2,
            minimum_fragment_size: 0,
            ..config(UnavailabilityPolicy::FailOpen)
        },
        ScriptedEmbedder::new(2, &[("wide()", vec![1.0, 0.0, 0.0])]),
        &store,
    )
    .await
    .unwrap();

    let fragment = python(&detector, "wide()", "a.py", "f");
    let err = detector.check(&fragment).await.unwrap_err();
    assert!(matches!(
        err,
        DetectorError::Store(VectorStoreError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    assert!(!err.is_unavailable());
}
