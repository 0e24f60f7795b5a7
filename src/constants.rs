/// QC policy constants shared by the anomaly detector and its callers.
/// Changing any of these changes which submissions get rejected, so they
/// live in one place rather than scattered through the detector.

// Interviews flagged as clustered when another interview by the same
// interviewer sits within this many meters.
pub const DEFAULT_CLUSTER_RADIUS_METERS: f64 = 5.0;

// Acceptable local start hours are [EARLIEST_NORMAL_HOUR, LATEST_NORMAL_HOUR];
// exactly 07:00 and anything in the 20:00 hour are fine.
pub const EARLIEST_NORMAL_HOUR: u32 = 7;
pub const LATEST_NORMAL_HOUR: u32 = 20;

// Length-of-interview outlier thresholds, as multiples of the batch mean.
pub const LOW_LOI_MULTIPLIER: f64 = 0.25;
pub const HIGH_LOI_MULTIPLIER: f64 = 2.0;

// Two interviews on one device starting within this window of each other
// ending are implausibly close together.
pub const SHORT_GAP_SECONDS: i64 = 60;

// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// Below this signed area a polygon is treated as degenerate and its
// centroid falls back to the vertex mean.
pub const AREA_EPSILON: f64 = 1e-12;
