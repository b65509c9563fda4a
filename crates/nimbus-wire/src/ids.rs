use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A monotonically assigned identifier derived from wall-clock time that
/// distinguishes successive archives of the same (collection_id, key).
///
/// Later `UnifiedId`s supersede earlier ones for the same key (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct UnifiedId(pub u64);

impl UnifiedId {
    /// Derive a fresh id from the current time, with microsecond resolution.
    ///
    /// Ties within the same microsecond are vanishingly unlikely for a single
    /// gateway process but are not disambiguated further; successive archives
    /// only need to compare strictly, which wall-clock microseconds provide
    /// in practice.
    pub fn generate() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_micros();
        Self(micros as u64)
    }
}

impl std::fmt::Display for UnifiedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates an outstanding request with its eventual reply on a
/// [`NodeClient`](crate) connection. Freshly minted per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
