use std::fmt;

use uuid::Uuid;

/// Identifies one HTTP call through logs, independent of the fingerprint of
/// the request it submits (two different HTTP calls for the same
/// fingerprint get different request ids, e.g. one that hits the cache and
/// one that queues).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
