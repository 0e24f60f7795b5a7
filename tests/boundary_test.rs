//! Boundary index loading: file sources, the single-flight cache, and
//! failure semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result as TestResult;
use async_trait::async_trait;
use serde_json::json;
use survey_qc::error::{QcError, Result};
use survey_qc::geo::boundary::{BoundaryCache, BoundaryFetcher};
use tempfile::tempdir;

fn feature_collection() -> String {
    json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "Ijebu Ode"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[3.8, 6.7], [4.0, 6.7], [4.0, 6.9], [3.8, 6.9], [3.8, 6.7]]]
                }
            }
        ]
    })
    .to_string()
}

/// In-memory fetcher that counts how often it is asked.
struct CountingFetcher {
    calls: AtomicUsize,
    body: Vec<u8>,
}

impl CountingFetcher {
    fn new(body: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            body: body.as_bytes().to_vec(),
        }
    }
}

#[async_trait]
impl BoundaryFetcher for CountingFetcher {
    async fn fetch(&self, _source: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

/// Fetcher that always fails, standing in for a dead network.
struct FailingFetcher;

#[async_trait]
impl BoundaryFetcher for FailingFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        Err(QcError::BoundarySource {
            message: format!("{} unreachable", source),
        })
    }
}

#[tokio::test]
async fn loads_from_a_geojson_file() -> TestResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ogun.geojson");
    std::fs::write(&path, feature_collection())?;

    let cache = BoundaryCache::new();
    let index = cache.load(path.to_str().unwrap()).await?;
    assert_eq!(index.polygons().len(), 1);
    assert!(index.find_by_name("IJEBU ODE").is_some());
    assert!(index.find_containing(6.8, 3.9).is_some());
    Ok(())
}

#[tokio::test]
async fn missing_file_surfaces_an_error() {
    let cache = BoundaryCache::new();
    let result = cache.load("/nonexistent/ogun.geojson").await;
    assert!(matches!(result, Err(QcError::BoundarySource { .. })));
}

#[tokio::test]
async fn repeated_loads_fetch_once() -> TestResult<()> {
    let fetcher = CountingFetcher::new(&feature_collection());
    let cache = BoundaryCache::new();

    let first = cache.load_with("ogun", &fetcher).await?;
    let second = cache.load_with("ogun", &fetcher).await?;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));

    // A different source is its own cache entry.
    cache.load_with("ogun-v2", &fetcher).await?;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_loads_share_one_fetch() {
    let fetcher = Arc::new(CountingFetcher::new(&feature_collection()));
    let cache = Arc::new(BoundaryCache::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let fetcher = fetcher.clone();
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.load_with("ogun", fetcher.as_ref()).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_loads_are_not_cached() {
    let cache = BoundaryCache::new();
    assert!(cache.load_with("ogun", &FailingFetcher).await.is_err());

    // The same source succeeds once the fetcher recovers.
    let fetcher = CountingFetcher::new(&feature_collection());
    let index = cache.load_with("ogun", &fetcher).await.unwrap();
    assert_eq!(index.polygons().len(), 1);
}

#[tokio::test]
async fn malformed_source_is_a_parse_error_not_an_empty_index() {
    let fetcher = CountingFetcher::new("{\"type\": \"FeatureCollection\"}");
    let cache = BoundaryCache::new();
    assert!(cache.load_with("ogun", &fetcher).await.is_err());
}
