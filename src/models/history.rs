use serde::{Deserialize, Serialize};

/// A granted bypass, as persisted under `bypassHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassRecord {
    pub site: String,
    pub timestamp: i64,
    /// Minutes granted.
    pub duration: i64,
}

/// A redirected navigation, as persisted under `blockHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub site: String,
    pub timestamp: i64,
}

/// Anything stored in a history log carries a timestamp.
pub trait Timestamped {
    fn timestamp(&self) -> i64;
}

impl Timestamped for BypassRecord {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Timestamped for BlockRecord {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
