//! Import de bout en bout : stockage local → source GeoJSON → writer en mémoire

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use geostream::RawFeature;
use parking_lot::Mutex;

use geoimport::export::postgres::feature_id;
use geoimport::pipeline::{run_import, run_import_detailed, EndReason, RowWriter};
use geoimport::source::SourceError;
use geoimport::storage::{Endpoint, StorageError};
use geoimport::{
    GeoJsonSource, ImportError, ImportOptions, ImportRequest, ObjectRef, ObjectStore,
    ObjectStoreConfig,
};

/// Writer en mémoire : décode chaque ligne et rejette les features dont la
/// propriété `reject` est vraie
#[derive(Default)]
struct MemoryWriter {
    ids: Mutex<BTreeSet<String>>,
}

#[async_trait]
impl RowWriter<RawFeature> for MemoryWriter {
    async fn write_rows(&self, rows: &[RawFeature]) -> anyhow::Result<()> {
        let mut batch = Vec::with_capacity(rows.len());
        for raw in rows {
            let feature = raw.decode()?;
            if feature.property("reject").and_then(|v| v.as_bool()) == Some(true) {
                bail!("rejected feature in batch");
            }
            batch.extend(feature_id(&feature, None));
        }
        self.ids.lock().extend(batch);
        Ok(())
    }
}

fn point(i: usize, reject: bool) -> String {
    format!(
        r#"{{"type":"Feature","id":"f{i}","geometry":{{"type":"Point","coordinates":[{},{}]}},"properties":{{"reject":{reject}}}}}"#,
        i as f64 * 0.01,
        45.0,
    )
}

/// Écrit une FeatureCollection dans `{root}/bucket/points.geojson`
fn write_document(name: &str, features: &[String]) -> PathBuf {
    let root = std::env::temp_dir().join(format!("geoimport_pipeline_{name}"));
    let dir = root.join("bucket");
    std::fs::create_dir_all(&dir).unwrap();

    let doc = format!(
        r#"{{"type":"FeatureCollection","name":"test","features":[{}]}}"#,
        features.join(",\n")
    );
    std::fs::write(dir.join("points.geojson"), doc).unwrap();
    root
}

/// FeatureCollection de `count` points, `reject` listant les index à refuser
fn write_collection(name: &str, count: usize, reject: &[usize]) -> PathBuf {
    let features: Vec<String> = (0..count).map(|i| point(i, reject.contains(&i))).collect();
    write_document(name, &features)
}

fn store(root: PathBuf) -> ObjectStore {
    ObjectStore::new(ObjectStoreConfig {
        endpoint: Endpoint::Local(root),
        ..Default::default()
    })
    .unwrap()
}

fn object() -> ObjectRef {
    ObjectRef::new("bucket", "points.geojson")
}

#[tokio::test]
async fn test_window_over_object() {
    let root = write_collection("window", 25, &[]);
    let store = store(root.clone());

    let mut source = GeoJsonSource::open(&store, &object()).await.unwrap();
    let writer = Arc::new(MemoryWriter::default());
    let request = ImportRequest {
        row_offset: 5,
        row_limit: Some(15),
        batch_size: 10,
    };

    let outcome = run_import_detailed(
        &mut source,
        Arc::clone(&writer),
        &request,
        &ImportOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.result.saved_row_count, 15);
    assert_eq!(outcome.result.failed_row_count, 0);
    assert_eq!(outcome.end_reason, EndReason::LimitReached);
    assert!(source.is_closed());
    assert_eq!(source.features_read(), 20);

    let ids = writer.ids.lock().clone();
    let expected: BTreeSet<String> = (5..20).map(|i| format!("f{i}")).collect();
    assert_eq!(ids, expected);

    std::fs::remove_dir_all(root).ok();
}

#[tokio::test]
async fn test_rejected_rows_are_isolated() {
    let root = write_collection("reject", 30, &[3, 17]);
    let store = store(root.clone());

    let mut source = GeoJsonSource::open(&store, &object()).await.unwrap();
    let writer = Arc::new(MemoryWriter::default());
    let request = ImportRequest {
        batch_size: 5,
        ..Default::default()
    };

    let outcome = run_import_detailed(
        &mut source,
        Arc::clone(&writer),
        &request,
        &ImportOptions { max_concurrency: 3 },
    )
    .await
    .unwrap();

    assert_eq!(outcome.result.saved_row_count, 28);
    assert_eq!(outcome.result.failed_row_count, 2);
    assert_eq!(outcome.failed_batches, 2);
    assert_eq!(outcome.end_reason, EndReason::Exhausted);

    let mut failed: Vec<String> = outcome
        .failures
        .iter()
        .filter_map(|f| feature_id(&f.row.decode().unwrap(), None))
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["f17", "f3"]);
    assert_eq!(writer.ids.lock().len(), 28);

    std::fs::remove_dir_all(root).ok();
}

#[tokio::test]
async fn test_bad_geometry_fails_only_its_row() {
    let mut features: Vec<String> = (0..12).map(|i| point(i, false)).collect();
    features[8] = r#"{"type":"Feature","id":"f8","geometry":{"type":"Point","coordinates":[1]},"properties":{}}"#.to_string();
    let root = write_document("bad_geometry", &features);
    let store = store(root.clone());

    let mut source = GeoJsonSource::open(&store, &object()).await.unwrap();
    let writer = Arc::new(MemoryWriter::default());
    let request = ImportRequest {
        batch_size: 5,
        ..Default::default()
    };

    let outcome = run_import_detailed(
        &mut source,
        Arc::clone(&writer),
        &request,
        &ImportOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.result.saved_row_count, 11);
    assert_eq!(outcome.result.failed_row_count, 1);
    assert_eq!(outcome.end_reason, EndReason::Exhausted);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].row.index, 8);
    assert!(!writer.ids.lock().contains("f8"));
    assert_eq!(source.features_read(), 12);

    std::fs::remove_dir_all(root).ok();
}

#[tokio::test]
async fn test_truncated_object_rejects_run() {
    let root = std::env::temp_dir().join("geoimport_pipeline_truncated");
    std::fs::create_dir_all(root.join("bucket")).unwrap();
    std::fs::write(
        root.join("bucket/points.geojson"),
        r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":null,"properties":{}},{"type":"Fea"#,
    )
    .unwrap();

    let store = store(root.clone());
    let mut source = GeoJsonSource::open(&store, &object()).await.unwrap();
    let result = run_import(
        &mut source,
        Arc::new(MemoryWriter::default()),
        &ImportRequest::default(),
        &ImportOptions::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(ImportError::Source(SourceError::Stream(_)))
    ));

    std::fs::remove_dir_all(root).ok();
}

#[tokio::test]
async fn test_missing_object() {
    let store = store(std::env::temp_dir().join("geoimport_pipeline_missing"));
    let result = GeoJsonSource::open(&store, &object()).await;
    assert!(matches!(
        result,
        Err(SourceError::Storage(StorageError::NotFound(_)))
    ));
}
