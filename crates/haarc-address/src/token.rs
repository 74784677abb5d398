//! Per-event uniqueness tokens

use chrono::Utc;

/// Timestamp plus entropy, hashed into the unique segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniquenessToken(Vec<u8>);

impl UniquenessToken {
    /// 8 bytes of big-endian UTC nanoseconds followed by 16 bytes of v4 UUID.
    pub fn fresh() -> Self {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros().saturating_mul(1_000));
        let mut bytes = Vec::with_capacity(24);
        bytes.extend_from_slice(&nanos.to_be_bytes());
        bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        Self(bytes)
    }

    /// Fixed token for replays and tests.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for UniquenessToken {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
