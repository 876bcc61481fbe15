use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed log: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("Key '{0}' has disappeared from data.")]
    KeyDisappeared(String),
    #[error("invalid value {value} for time axis '{key}'")]
    InvalidAxisValue { key: String, value: f64 },
    #[error("time axis '{axis}' does not match the axes this series was created with")]
    AxisMismatch { axis: &'static str },
    #[error("length mismatch: x has {x} values, y has {y}")]
    LengthMismatch { x: usize, y: usize },
    #[error("timeline handler lock poisoned")]
    Poisoned,
    #[cfg(feature = "watch")]
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
