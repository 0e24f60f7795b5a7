pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod geo;
pub mod logging;
pub mod pipeline;

pub use config::QcConfig;
pub use domain::{AnnotatedSubmission, ApprovalStatus, FlagKind, GeotagStatus, Submission};
pub use error::{QcError, Result};
pub use geo::boundary::{load_boundaries, BoundaryIndex};
pub use pipeline::processing::anomaly::{annotate, AnnotateOptions, Thresholds};
pub use pipeline::processing::normalize::{normalize, normalize_batch, RawRecord};
