use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Baseline approval state carried in from the intake system, before any
/// human override downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    NotApproved,
}

/// Outcome of checking a submission's coordinates against its declared
/// administrative boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeotagStatus {
    Inside,
    Outside,
    #[default]
    Unknown,
}

/// Automatic QC flags. This is a closed vocabulary: the normalizer drops
/// any source-supplied token outside it, so downstream code never sees
/// out-of-vocabulary flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    #[serde(rename = "LowLOI")]
    LowLoi,
    #[serde(rename = "HighLOI")]
    HighLoi,
    OddHour,
    DuplicatePhone,
    Interwoven,
    ShortGap,
    ClusteredInterview,
    OutsideBoundary,
}

impl FlagKind {
    pub const ALL: [FlagKind; 8] = [
        FlagKind::LowLoi,
        FlagKind::HighLoi,
        FlagKind::OddHour,
        FlagKind::DuplicatePhone,
        FlagKind::Interwoven,
        FlagKind::ShortGap,
        FlagKind::ClusteredInterview,
        FlagKind::OutsideBoundary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::LowLoi => "LowLOI",
            FlagKind::HighLoi => "HighLOI",
            FlagKind::OddHour => "OddHour",
            FlagKind::DuplicatePhone => "DuplicatePhone",
            FlagKind::Interwoven => "Interwoven",
            FlagKind::ShortGap => "ShortGap",
            FlagKind::ClusteredInterview => "ClusteredInterview",
            FlagKind::OutsideBoundary => "OutsideBoundary",
        }
    }

    /// Case-insensitive lookup tolerant of snake_case and spaced forms
    /// ("low_loi", "Odd Hour"). Unknown tokens yield None.
    pub fn parse(token: &str) -> Option<FlagKind> {
        let key: String = token
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "lowloi" => Some(FlagKind::LowLoi),
            "highloi" => Some(FlagKind::HighLoi),
            "oddhour" => Some(FlagKind::OddHour),
            "duplicatephone" => Some(FlagKind::DuplicatePhone),
            "interwoven" => Some(FlagKind::Interwoven),
            "shortgap" => Some(FlagKind::ShortGap),
            "clusteredinterview" => Some(FlagKind::ClusteredInterview),
            "outsideboundary" => Some(FlagKind::OutsideBoundary),
            _ => None,
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field-survey submission in canonical form. Built once by the
/// normalizer and never mutated; everything the QC engine derives goes
/// into a separate [`AnnotatedSubmission`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    /// Missing coordinates stay missing; they are never defaulted to zero.
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub interviewer_id: String,
    pub device_id: Option<String>,
    /// Respondent contact, digits and `+` only. Used solely for duplicate
    /// detection.
    pub phone: Option<String>,
    pub lga: String,
    pub state: String,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub duration_minutes: Option<f64>,
    pub status: ApprovalStatus,
    /// Flags already attached by the source system, validated against the
    /// closed vocabulary. Seeds the annotated flag set.
    pub source_flags: Vec<FlagKind>,
}

impl Submission {
    /// Devices and interviewers share one actor namespace for temporal
    /// overlap checks; a missing device id falls back to the interviewer.
    pub fn actor_id(&self) -> &str {
        self.device_id.as_deref().unwrap_or(&self.interviewer_id)
    }

    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// A submission plus everything the anomaly detector derived for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSubmission {
    pub submission: Submission,
    /// Unique by construction; BTreeSet gives a stable render order.
    pub flags: BTreeSet<FlagKind>,
    pub geotag_status: GeotagStatus,
    /// Ids of other same-interviewer submissions within the cluster
    /// radius. Symmetric: if A lists B, B lists A.
    pub clustered_with: BTreeSet<String>,
    /// Distance to the nearest same-interviewer submission. None iff this
    /// submission has no coordinates or no other same-interviewer
    /// submission has coordinates.
    pub proximity_distance_meters: Option<f64>,
}

impl AnnotatedSubmission {
    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }
}
