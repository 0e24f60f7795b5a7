//! Record normalizer: converts heterogeneous raw key/value records into
//! canonical [`Submission`] values.
//!
//! Every logical field resolves through an ordered alias table. The first
//! key *present* in the record wins, even when its value is blank or
//! unparsable; alias fallthrough is driven by key absence only. Existing
//! dashboards depend on that precedence, so it is pinned by tests here
//! rather than "fixed".

use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ApprovalStatus, FlagKind, Submission};

/// A raw intake record: arbitrary key names from whichever connector
/// produced it.
pub type RawRecord = Map<String, Value>;

// Ordered source-key aliases per logical field. Dataset-specific
// composite keys come before generic fallbacks; each table also carries
// the canonical Submission field name so re-normalizing canonical
// output is a no-op.
const ID_ALIASES: &[&str] = &["submission_id", "SubmissionID", "_id", "instanceID", "id"];
const LAT_ALIASES: &[&str] = &[
    "a4_gps_coordinates_latitude",
    "gps_latitude",
    "_gps_latitude",
    "latitude",
    "lat",
];
const LNG_ALIASES: &[&str] = &[
    "a4_gps_coordinates_longitude",
    "gps_longitude",
    "_gps_longitude",
    "longitude",
    "lng",
    "lon",
];
const INTERVIEWER_ALIASES: &[&str] = &[
    "a2_enumerator_name",
    "enumerator_name",
    "enumerator",
    "interviewer_id",
    "interviewer",
];
const DEVICE_ALIASES: &[&str] = &["deviceid", "imei", "device_id", "device"];
const PHONE_ALIASES: &[&str] = &[
    "a11_respondent_phone_number",
    "respondent_phone",
    "phone_number",
    "phone",
];
const LGA_ALIASES: &[&str] = &["a3_select_the_lga", "a3_lga", "lga_name", "lga"];
const STATE_ALIASES: &[&str] = &["a1_state", "state_name", "state"];
const START_ALIASES: &[&str] = &["starttime", "_submission_start", "start_time", "start"];
const END_ALIASES: &[&str] = &["endtime", "_submission_end", "end_time", "end"];
const DURATION_ALIASES: &[&str] = &["duration_minutes", "interview_duration", "duration"];
const STATUS_ALIASES: &[&str] = &[
    "review_status",
    "_validation_status",
    "approval_status",
    "status",
];
const FLAG_ALIASES: &[&str] = &["error_flags", "qc_flags", "errors", "source_flags", "flags"];

const APPROVED_TOKENS: &[&str] = &["approved", "valid", "true", "1", "yes", "ok"];
const REJECTED_TOKENS: &[&str] = &["not approved", "invalid", "false", "0", "no", "cancelled"];

// Everything except digits, sign, and decimal point; this is what strips
// thousands separators and unit suffixes.
static NUMERIC_CLEAN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9+\-.]").unwrap());

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// First key present in the record wins, even when its value is blank.
fn resolve<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|key| record.get(*key))
}

/// Non-empty trimmed text from a scalar value. Blank strings and nulls
/// read as missing.
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric parse that strips thousands separators and any character
/// other than digits, sign, and decimal point. Unparsable yields None.
fn parse_number(value: &Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return n.is_finite().then_some(n);
    }
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let cleaned = NUMERIC_CLEAN_RE.replace_all(text, "");
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// ISO-like timestamp parse; unparsable strings yield None, never an
/// error. Offset timestamps keep their local wall-clock time, since the
/// odd-hour check cares about the interviewer's clock.
fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// Approval vocabulary. Anything outside both token sets that does not
/// read as a negation is treated as approved (fail open, preserved from
/// the source system pending product-owner confirmation).
fn parse_status(value: &Value) -> ApprovalStatus {
    match value {
        Value::Bool(b) => {
            if *b {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::NotApproved
            }
        }
        Value::Number(n) => {
            if n.as_f64() == Some(0.0) {
                ApprovalStatus::NotApproved
            } else {
                ApprovalStatus::Approved
            }
        }
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            if APPROVED_TOKENS.contains(&token.as_str()) {
                ApprovalStatus::Approved
            } else if REJECTED_TOKENS.contains(&token.as_str())
                || token.contains("not")
                || token.contains("cancel")
            {
                ApprovalStatus::NotApproved
            } else {
                ApprovalStatus::Approved
            }
        }
        _ => ApprovalStatus::Approved,
    }
}

/// Flag lists arrive as native arrays or `,`/`;`/`|`-delimited strings.
/// Tokens are matched case-insensitively against the closed FlagKind
/// vocabulary and de-duplicated; unrecognized tokens are dropped.
fn parse_flags(value: &Value) -> Vec<FlagKind> {
    let mut seen: BTreeSet<FlagKind> = BTreeSet::new();
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(flag) = item.as_str().and_then(FlagKind::parse) {
                    seen.insert(flag);
                }
            }
        }
        Value::String(s) => {
            for token in s.split([',', ';', '|']) {
                if let Some(flag) = FlagKind::parse(token.trim()) {
                    seen.insert(flag);
                }
            }
        }
        _ => {}
    }
    seen.into_iter().collect()
}

/// Keep digits and `+` only. Idempotent.
pub fn normalize_phone(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Convert one raw record into a canonical Submission. Never fails:
/// unresolvable fields degrade to None / "Unknown", and a record with
/// nothing resolvable still comes out the other side.
pub fn normalize(record: &RawRecord) -> Submission {
    let id = resolve(record, ID_ALIASES)
        .and_then(value_to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let lat = resolve(record, LAT_ALIASES).and_then(parse_number);
    let lng = resolve(record, LNG_ALIASES).and_then(parse_number);

    let interviewer_id = resolve(record, INTERVIEWER_ALIASES)
        .and_then(value_to_string)
        .unwrap_or_else(|| "Unknown".to_string());
    let device_id = resolve(record, DEVICE_ALIASES).and_then(value_to_string);

    let phone = resolve(record, PHONE_ALIASES)
        .and_then(value_to_string)
        .map(|raw| normalize_phone(&raw))
        .filter(|normalized| !normalized.is_empty());

    let lga = resolve(record, LGA_ALIASES)
        .and_then(value_to_string)
        .unwrap_or_else(|| "Unknown".to_string());
    let state = resolve(record, STATE_ALIASES)
        .and_then(value_to_string)
        .unwrap_or_else(|| "Unknown".to_string());

    let start_time = resolve(record, START_ALIASES).and_then(parse_timestamp);
    let end_time = resolve(record, END_ALIASES).and_then(parse_timestamp);

    let duration_minutes = resolve(record, DURATION_ALIASES)
        .and_then(parse_number)
        .or_else(|| match (start_time, end_time) {
            (Some(start), Some(end)) => Some((end - start).num_seconds() as f64 / 60.0),
            _ => None,
        });

    let status = resolve(record, STATUS_ALIASES)
        .map(parse_status)
        .unwrap_or(ApprovalStatus::Approved);

    let source_flags = resolve(record, FLAG_ALIASES)
        .map(parse_flags)
        .unwrap_or_default();

    Submission {
        id,
        lat,
        lng,
        interviewer_id,
        device_id,
        phone,
        lga,
        state,
        start_time,
        end_time,
        duration_minutes,
        status,
        source_flags,
    }
}

/// Normalize a whole intake batch. Records are never dropped.
pub fn normalize_batch(records: &[RawRecord]) -> Vec<Submission> {
    let submissions: Vec<Submission> = records.iter().map(normalize).collect();
    debug!(count = submissions.len(), "normalized intake batch");
    submissions
}
