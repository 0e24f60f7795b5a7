//! Named administrative boundary polygons: GeoJSON loading, name-keyed
//! and point-based lookup, and a process-wide single-flight cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::error::{QcError, Result};
use crate::geo::{self, Geometry};

/// Property keys consulted, in order, for a feature's display name.
/// Sources vary: plain GeoJSON exports, GRID3 admin dumps, QGIS exports.
const NAME_PROPERTY_KEYS: &[&str] = &[
    "name",
    "Name",
    "NAME",
    "lga_name",
    "LGA_NAME",
    "shapeName",
    "admin2Name",
    "ADM2_EN",
];

/// One named administrative area with its precomputed centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPolygon {
    pub name: String,
    pub geometry: Geometry,
    /// `[lat, lng]`, area-weighted across rings (holes subtract).
    pub centroid: [f64; 2],
}

/// Read-only collection of named boundary polygons. Built once from a
/// source, never mutated afterwards.
#[derive(Debug)]
pub struct BoundaryIndex {
    polygons: Vec<BoundaryPolygon>,
}

impl BoundaryIndex {
    /// Parse a GeoJSON-like FeatureCollection. Features without a usable
    /// name or with a non-areal geometry are skipped with a warning; a
    /// source yielding no polygons at all is an error, because callers
    /// must be able to distinguish "failed to load" from "nothing
    /// configured".
    pub fn from_geojson(bytes: &[u8]) -> Result<Self> {
        let doc: Value = serde_json::from_slice(bytes)?;
        let features = doc
            .get("features")
            .and_then(|f| f.as_array())
            .ok_or_else(|| QcError::BoundarySource {
                message: "source has no features array".to_string(),
            })?;

        let mut polygons = Vec::new();
        for feature in features {
            let Some(geometry_value) = feature.get("geometry") else {
                continue;
            };
            let geometry: Geometry = match serde_json::from_value(geometry_value.clone()) {
                Ok(geometry) => geometry,
                Err(_) => {
                    warn!("skipping feature with non-polygon geometry");
                    continue;
                }
            };
            let name = feature
                .get("properties")
                .and_then(|properties| {
                    NAME_PROPERTY_KEYS
                        .iter()
                        .find_map(|key| properties.get(*key).and_then(|v| v.as_str()))
                })
                .map(str::trim)
                .unwrap_or("");
            if name.is_empty() {
                warn!("skipping boundary feature without a display name");
                continue;
            }
            let centroid = geo::centroid(&geometry);
            polygons.push(BoundaryPolygon {
                name: name.to_string(),
                geometry,
                centroid,
            });
        }

        if polygons.is_empty() {
            return Err(QcError::BoundarySource {
                message: "source contained no named polygon features".to_string(),
            });
        }
        info!(count = polygons.len(), "loaded boundary polygons");
        Ok(Self { polygons })
    }

    pub fn polygons(&self) -> &[BoundaryPolygon] {
        &self.polygons
    }

    /// Case-insensitive name lookup.
    pub fn find_by_name(&self, name: &str) -> Option<&BoundaryPolygon> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.polygons
            .iter()
            .find(|polygon| polygon.name.to_lowercase() == needle)
    }

    /// Linear scan over all polygons; ties between overlapping polygons
    /// resolve by input order, not by area.
    pub fn find_containing(&self, lat: f64, lng: f64) -> Option<&BoundaryPolygon> {
        self.polygons
            .iter()
            .find(|polygon| geo::point_in_feature(lng, lat, &polygon.geometry))
    }
}

/// Fetches raw boundary bytes for a source string. Seam for tests to
/// inject in-memory sources.
#[async_trait]
pub trait BoundaryFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>>;
}

/// Default fetcher: `http(s)://` sources via reqwest, everything else
/// read as a file path.
pub struct DefaultFetcher;

#[async_trait]
impl BoundaryFetcher for DefaultFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        if source.starts_with("http://") || source.starts_with("https://") {
            debug!(source, "fetching boundary source over HTTP");
            let response = reqwest::get(source).await?;
            if !response.status().is_success() {
                return Err(QcError::BoundarySource {
                    message: format!("{} returned {}", source, response.status()),
                });
            }
            Ok(response.bytes().await?.to_vec())
        } else {
            tokio::fs::read(source)
                .await
                .map_err(|e| QcError::BoundarySource {
                    message: format!("failed to read {}: {}", source, e),
                })
        }
    }
}

type Slot = Arc<OnceCell<Arc<BoundaryIndex>>>;

/// Single-flight cache of loaded boundary indexes keyed by source. The
/// first caller for a source performs the fetch; concurrent callers for
/// the same source await that same initialization (cache-or-wait, not
/// cache-or-reload). Failed loads are not cached, so a retry re-fetches.
pub struct BoundaryCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl BoundaryCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self, source: &str) -> Result<Arc<BoundaryIndex>> {
        self.load_with(source, &DefaultFetcher).await
    }

    pub async fn load_with(
        &self,
        source: &str,
        fetcher: &dyn BoundaryFetcher,
    ) -> Result<Arc<BoundaryIndex>> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(source.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let index = slot
            .get_or_try_init(|| async {
                debug!(source, "loading boundary polygons");
                let bytes = fetcher.fetch(source).await?;
                BoundaryIndex::from_geojson(&bytes).map(Arc::new)
            })
            .await?;
        Ok(index.clone())
    }
}

impl Default for BoundaryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide cache used by production callers; lives for the process
/// lifetime. Tests construct their own [`BoundaryCache`] for isolation.
static BOUNDARY_CACHE: Lazy<BoundaryCache> = Lazy::new(BoundaryCache::new);

/// Load-once, read-many convenience over the process-wide cache.
pub async fn load_boundaries(source: &str) -> Result<Arc<BoundaryIndex>> {
    BOUNDARY_CACHE.load(source).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_collection() -> Vec<u8> {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"lga_name": "Ijebu East"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[3.9, 6.7], [4.1, 6.7], [4.1, 6.9], [3.9, 6.9], [3.9, 6.7]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"lga_name": "Ijebu North"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[3.9, 6.9], [4.1, 6.9], [4.1, 7.1], [3.9, 7.1], [3.9, 6.9]]]
                    }
                }
            ]
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn loads_named_polygons() {
        let index = BoundaryIndex::from_geojson(&sample_collection()).unwrap();
        assert_eq!(index.polygons().len(), 2);
        let polygon = index.find_by_name("ijebu east").unwrap();
        assert_eq!(polygon.name, "Ijebu East");
        // Centroid of the 0.2-degree square around (6.8, 4.0).
        assert!((polygon.centroid[0] - 6.8).abs() < 1e-9);
        assert!((polygon.centroid[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn find_by_name_misses_are_none() {
        let index = BoundaryIndex::from_geojson(&sample_collection()).unwrap();
        assert!(index.find_by_name("Ijebu Ode").is_none());
        assert!(index.find_by_name("").is_none());
    }

    #[test]
    fn find_containing_scans_in_input_order() {
        let index = BoundaryIndex::from_geojson(&sample_collection()).unwrap();
        let hit = index.find_containing(6.8, 4.0).unwrap();
        assert_eq!(hit.name, "Ijebu East");
        assert!(index.find_containing(0.0, 0.0).is_none());
    }

    #[test]
    fn empty_feature_collection_is_an_error() {
        let empty = json!({"type": "FeatureCollection", "features": []}).to_string();
        assert!(BoundaryIndex::from_geojson(empty.as_bytes()).is_err());
    }

    #[test]
    fn missing_features_array_is_an_error() {
        assert!(BoundaryIndex::from_geojson(b"{\"type\": \"FeatureCollection\"}").is_err());
    }
}
