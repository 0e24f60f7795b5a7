// Submission QC pipeline: normalization, anomaly detection, reporting

pub mod processing;
