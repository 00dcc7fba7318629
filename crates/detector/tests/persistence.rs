mod support;

use dupgate_detector::{DetectorConfig, DetectorError, DuplicateDetector, VerdictReason};
use dupgate_vector_store::{LexicalEmbedder, LocalVectorStore, VectorStore, VectorStoreError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{python, FIND_MAX, RENAMED_TOTAL, SUM_TOTAL};
use tempfile::TempDir;

fn config(dimensionality: usize) -> DetectorConfig {
    DetectorConfig {
        dimensionality,
        collection_name: "fragments".to_string(),
        ..DetectorConfig::default()
    }
}

async fn open(
    dir: &TempDir,
    dimensionality: usize,
) -> Result<(LocalVectorStore, DuplicateDetector), DetectorError> {
    let store = LocalVectorStore::open(dir.path())?;
    let detector = DuplicateDetector::connect(
        config(dimensionality),
        Arc::new(LexicalEmbedder::new(dimensionality)),
        &store,
    )
    .await?;
    Ok((store, detector))
}

#[tokio::test]
async fn index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (store, detector) = open(&dir, 384).await.unwrap();
        let fragment = python(&detector, SUM_TOTAL, "a.py", "sum_total");
        assert!(detector.check(&fragment).await.unwrap().indexed);
        store.shutdown().await.unwrap();
    }
    assert!(dir.path().join("fragments.json").exists());

    let (_store, detector) = open(&dir, 384).await.unwrap();
    let fragment = python(&detector, RENAMED_TOTAL, "b.py", "total");
    let verdict = detector.check(&fragment).await.unwrap();
    assert!(verdict.is_duplicate);
    assert_eq!(verdict.best_match.unwrap().metadata.origin, "a.py:sum_total");
}

#[tokio::test]
async fn reopening_with_another_dimensionality_conflicts() {
    let dir = TempDir::new().unwrap();
    open(&dir, 384).await.unwrap();

    let err = open(&dir, 64).await.err().unwrap();
    assert!(matches!(
        err,
        DetectorError::Store(VectorStoreError::DimensionalityConflict {
            existing: 384,
            requested: 64,
            ..
        })
    ));
}

#[tokio::test]
async fn forget_and_reconcile_remove_stale_records() {
    let dir = TempDir::new().unwrap();
    let (_store, detector) = open(&dir, 384).await.unwrap();
    for (body, path, symbol) in [
        (SUM_TOTAL, "a.py", "sum_total"),
        (FIND_MAX, "b.py", "find_max"),
        (FIND_MAX.replace("best", "top").as_str(), "c.py", "find_top"),
    ] {
        assert!(detector.index(&python(&detector, body, path, symbol)).await.unwrap());
    }

    assert_eq!(detector.forget_file("a.py").await.unwrap(), 1);
    assert_eq!(detector.forget_file("a.py").await.unwrap(), 0);
    assert_eq!(detector.reconcile(|path| path != "b.py").await.unwrap(), 1);

    let fragment = python(&detector, RENAMED_TOTAL, "d.py", "total");
    let verdict = detector.check(&fragment).await.unwrap();
    assert!(!verdict.is_duplicate);
    assert_eq!(verdict.reason, VerdictReason::BelowThreshold);
    assert_eq!(verdict.best_match.unwrap().metadata.file_path, "c.py");
}

#[tokio::test]
async fn identical_code_at_two_origins_keeps_both_records() {
    let dir = TempDir::new().unwrap();
    let (_store, detector) = open(&dir, 384).await.unwrap();
    let first = python(&detector, SUM_TOTAL, "a.py", "sum_total");
    let second = python(&detector, SUM_TOTAL, "b.py", "sum_total");
    assert_eq!(first.content_hash(), second.content_hash());
    assert!(detector.index(&first).await.unwrap());
    assert!(detector.index(&second).await.unwrap());

    assert_eq!(detector.forget_file("b.py").await.unwrap(), 1);

    let verdict = detector
        .check(&python(&detector, RENAMED_TOTAL, "c.py", "total"))
        .await
        .unwrap();
    assert!(verdict.is_duplicate);
    assert_eq!(verdict.reason, VerdictReason::AboveThreshold);
    assert_eq!(verdict.best_match.unwrap().metadata.origin, "a.py:sum_total");
}
