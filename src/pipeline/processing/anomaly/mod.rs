//! Anomaly detector: single-pass batch analysis that produces every
//! automatic QC flag for a batch of normalized submissions.
//!
//! The whole pass is pure and synchronous. Several checks need
//! full-batch statistics (the duration mean, the phone index), so this
//! runs over a complete batch rather than a stream. Malformed fields on
//! an individual record degrade that record's specific check to
//! "insufficient evidence"; they never abort the batch or drop the
//! record from the output.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Timelike;
use tracing::debug;

use crate::constants::{
    DEFAULT_CLUSTER_RADIUS_METERS, EARLIEST_NORMAL_HOUR, HIGH_LOI_MULTIPLIER, LATEST_NORMAL_HOUR,
    LOW_LOI_MULTIPLIER, SHORT_GAP_SECONDS,
};
use crate::domain::{AnnotatedSubmission, FlagKind, GeotagStatus, Submission};
use crate::geo;
use crate::geo::boundary::BoundaryIndex;
use crate::pipeline::processing::normalize::normalize_phone;

/// Tunable flagging thresholds, defaulting to the shipped QC policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub earliest_normal_hour: u32,
    pub latest_normal_hour: u32,
    pub low_loi_multiplier: f64,
    pub high_loi_multiplier: f64,
    pub short_gap_seconds: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            earliest_normal_hour: EARLIEST_NORMAL_HOUR,
            latest_normal_hour: LATEST_NORMAL_HOUR,
            low_loi_multiplier: LOW_LOI_MULTIPLIER,
            high_loi_multiplier: HIGH_LOI_MULTIPLIER,
            short_gap_seconds: SHORT_GAP_SECONDS,
        }
    }
}

/// Options for a batch annotation run. Boundary loading is the caller's
/// responsibility; `boundaries: None` means geofencing is disabled.
#[derive(Clone, Default)]
pub struct AnnotateOptions {
    pub cluster_radius_meters: Option<f64>,
    pub thresholds: Thresholds,
    pub boundaries: Option<Arc<BoundaryIndex>>,
}

impl AnnotateOptions {
    /// Options from loaded configuration. Boundary loading stays the
    /// caller's responsibility, so a load failure surfaces before any
    /// annotation happens instead of silently disabling geofencing.
    pub fn from_config(config: &crate::config::QcConfig) -> Self {
        Self {
            cluster_radius_meters: Some(config.cluster_radius_meters),
            thresholds: Thresholds {
                earliest_normal_hour: config.earliest_normal_hour,
                latest_normal_hour: config.latest_normal_hour,
                low_loi_multiplier: config.low_loi_multiplier,
                high_loi_multiplier: config.high_loi_multiplier,
                short_gap_seconds: config.short_gap_seconds,
            },
            boundaries: None,
        }
    }

    fn radius(&self) -> f64 {
        self.cluster_radius_meters
            .unwrap_or(DEFAULT_CLUSTER_RADIUS_METERS)
    }
}

/// Annotate a batch. Deterministic for a given input order; every input
/// submission appears exactly once in the output, annotated
/// all-or-nothing.
pub fn annotate(submissions: &[Submission], options: &AnnotateOptions) -> Vec<AnnotatedSubmission> {
    let radius = options.radius();
    debug_assert!(radius >= 0.0, "cluster radius must be non-negative");
    debug_assert!(
        submissions.iter().all(|s| {
            s.lat.map_or(true, f64::is_finite) && s.lng.map_or(true, f64::is_finite)
        }),
        "coordinates must be finite"
    );

    let mut batch: Vec<AnnotatedSubmission> = submissions
        .iter()
        .map(|submission| AnnotatedSubmission {
            flags: submission.source_flags.iter().copied().collect(),
            geotag_status: GeotagStatus::Unknown,
            clustered_with: BTreeSet::new(),
            proximity_distance_meters: None,
            submission: submission.clone(),
        })
        .collect();

    flag_duration_outliers(&mut batch, options.thresholds);
    flag_odd_hours(&mut batch, options.thresholds);
    flag_duplicate_phones(&mut batch);
    flag_interwoven_and_short_gaps(&mut batch, options.thresholds);
    flag_outside_boundary(&mut batch, options.boundaries.as_deref());
    flag_clusters(&mut batch, radius);

    debug!(
        total = batch.len(),
        flagged = batch.iter().filter(|a| a.is_flagged()).count(),
        "annotated submission batch"
    );
    batch
}

/// LowLOI / HighLOI against the batch mean of valid positive durations.
/// Durations that are missing, non-finite, or non-positive stay out of
/// the mean; any present finite duration is still evaluated against it.
/// No valid durations in the batch means no mean and no LOI flags.
fn flag_duration_outliers(batch: &mut [AnnotatedSubmission], thresholds: Thresholds) {
    let valid: Vec<f64> = batch
        .iter()
        .filter_map(|entry| entry.submission.duration_minutes)
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    if valid.is_empty() {
        return;
    }
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;

    for entry in batch.iter_mut() {
        let Some(duration) = entry.submission.duration_minutes else {
            continue;
        };
        if !duration.is_finite() {
            continue;
        }
        if duration < thresholds.low_loi_multiplier * mean {
            entry.flags.insert(FlagKind::LowLoi);
        } else if duration > thresholds.high_loi_multiplier * mean {
            entry.flags.insert(FlagKind::HighLoi);
        }
    }
}

/// Interviews starting in the local hours before the earliest normal
/// hour or after the latest. Under the defaults, 07:00 exactly and
/// anything inside the 20:00 hour pass.
fn flag_odd_hours(batch: &mut [AnnotatedSubmission], thresholds: Thresholds) {
    for entry in batch.iter_mut() {
        let Some(start) = entry.submission.start_time else {
            continue;
        };
        let hour = start.hour();
        if hour < thresholds.earliest_normal_hour || hour > thresholds.latest_normal_hour {
            entry.flags.insert(FlagKind::OddHour);
        }
    }
}

/// Every member of a group of two or more submissions sharing a
/// normalized phone number is flagged. Empty phones form no group.
fn flag_duplicate_phones(batch: &mut [AnnotatedSubmission]) {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, entry) in batch.iter().enumerate() {
        let Some(phone) = &entry.submission.phone else {
            continue;
        };
        let normalized = normalize_phone(phone);
        if normalized.is_empty() {
            continue;
        }
        groups.entry(normalized).or_default().push(i);
    }
    for indexes in groups.values().filter(|indexes| indexes.len() >= 2) {
        for &i in indexes {
            batch[i].flags.insert(FlagKind::DuplicatePhone);
        }
    }
}

/// Walk each device's timeline in start order. Overlapping pairs flag
/// both ends Interwoven; a non-overlapping pair whose gap is under the
/// short-gap window flags the later one ShortGap. Submissions with an
/// unknown start sort as time zero (pinned behavior: their known end
/// time can still overlap a legitimately early interview); a pair is
/// skipped entirely when the endpoint it needs is missing.
fn flag_interwoven_and_short_gaps(batch: &mut [AnnotatedSubmission], thresholds: Thresholds) {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, entry) in batch.iter().enumerate() {
        groups
            .entry(entry.submission.actor_id().to_string())
            .or_default()
            .push(i);
    }

    for indexes in groups.values_mut() {
        indexes.sort_by_key(|&i| {
            batch[i]
                .submission
                .start_time
                .map(|t| t.and_utc().timestamp())
                .unwrap_or(0)
        });

        for pair in indexes.windows(2) {
            let (prev, current) = (pair[0], pair[1]);
            let (Some(prev_end), Some(current_start)) = (
                batch[prev].submission.end_time,
                batch[current].submission.start_time,
            ) else {
                continue;
            };
            if prev_end > current_start {
                batch[prev].flags.insert(FlagKind::Interwoven);
                batch[current].flags.insert(FlagKind::Interwoven);
            } else {
                let gap_seconds = (current_start - prev_end).num_seconds();
                if (0..thresholds.short_gap_seconds).contains(&gap_seconds) {
                    batch[current].flags.insert(FlagKind::ShortGap);
                }
            }
        }
    }
}

/// Geofence each submission against the polygon matching its declared
/// LGA. An unmatched boundary name or missing coordinates yields
/// Unknown, never Outside.
fn flag_outside_boundary(batch: &mut [AnnotatedSubmission], boundaries: Option<&BoundaryIndex>) {
    let Some(index) = boundaries else {
        return;
    };
    for entry in batch.iter_mut() {
        let Some((lat, lng)) = entry.submission.coords() else {
            continue;
        };
        let Some(polygon) = index.find_by_name(&entry.submission.lga) else {
            continue;
        };
        if geo::point_in_feature(lng, lat, &polygon.geometry) {
            entry.geotag_status = GeotagStatus::Inside;
        } else {
            entry.geotag_status = GeotagStatus::Outside;
            entry.flags.insert(FlagKind::OutsideBoundary);
        }
    }
}

/// Pairwise haversine clustering within each interviewer's submissions.
/// O(n^2) per group; group sizes are bounded by per-interviewer daily
/// workload, not dataset size.
fn flag_clusters(batch: &mut [AnnotatedSubmission], radius_meters: f64) {
    let mut groups: HashMap<String, Vec<(usize, f64, f64)>> = HashMap::new();
    for (i, entry) in batch.iter().enumerate() {
        if let Some((lat, lng)) = entry.submission.coords() {
            groups
                .entry(entry.submission.interviewer_id.clone())
                .or_default()
                .push((i, lat, lng));
        }
    }

    for members in groups.values() {
        if members.len() < 2 {
            continue;
        }
        let mut nearest = vec![f64::INFINITY; members.len()];
        let mut within: Vec<Vec<usize>> = vec![Vec::new(); members.len()];

        for a in 0..members.len() {
            for b in (a + 1)..members.len() {
                let (_, lat_a, lng_a) = members[a];
                let (_, lat_b, lng_b) = members[b];
                let distance = geo::haversine_meters(lat_a, lng_a, lat_b, lng_b);
                if distance < nearest[a] {
                    nearest[a] = distance;
                }
                if distance < nearest[b] {
                    nearest[b] = distance;
                }
                if distance <= radius_meters {
                    within[a].push(b);
                    within[b].push(a);
                }
            }
        }

        for (position, &(index, _, _)) in members.iter().enumerate() {
            batch[index].proximity_distance_meters = Some(nearest[position]);
            if !within[position].is_empty() {
                batch[index].flags.insert(FlagKind::ClusteredInterview);
                let ids: Vec<String> = within[position]
                    .iter()
                    .map(|&other| batch[members[other].0].submission.id.clone())
                    .collect();
                batch[index].clustered_with.extend(ids);
            }
        }
    }
}
