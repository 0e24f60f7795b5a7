use thiserror::Error;

#[derive(Error, Debug)]
pub enum QcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Boundary source error: {message}")]
    BoundarySource { message: String },
}

pub type Result<T> = std::result::Result<T, QcError>;
