// Pipeline processing: record normalization, anomaly annotation, reporting

pub mod anomaly;
pub mod normalize;
pub mod report;
