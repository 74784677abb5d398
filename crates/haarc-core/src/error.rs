//! Error types for haarc

use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("range overlap: {new:#X?} intersects registered {existing:#X?}")]
    RangeOverlap {
        new: RangeInclusive<u32>,
        existing: RangeInclusive<u32>,
    },

    #[error("classifier timed out after {0}ms")]
    ClassifierTimeout(u64),

    #[error("classifier error: {0}")]
    ClassifierError(String),

    #[error("provisioning failure: {0}")]
    ProvisioningFailure(String),

    #[error("alert delivery failed: {0}")]
    AlertFailure(String),

    #[error("capacity unavailable: {0}")]
    CapacityUnavailable(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("decision queue closed")]
    QueueClosed,

    #[error("decision queue full")]
    QueueFull,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_context(reason: impl Into<String>) -> Self {
        Self::InvalidContext(reason.into())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms,
        }
    }

    /// Configuration-time errors abort startup; everything else is a runtime
    /// condition isolated to a single cycle.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::RangeOverlap { .. } | Self::Config(_) | Self::Toml(_))
    }
}
