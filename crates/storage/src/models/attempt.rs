use serde::{Deserialize, Serialize};

/// A single attempt of a result.
///
/// Positive values are performances (lower is better); the remaining values are
/// the markers below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub result: i64,
}

impl Attempt {
    pub const SKIPPED: i64 = 0;
    pub const DNF: i64 = -1;
    pub const DNS: i64 = -2;
    /// Largest value a stored attempt may hold
    pub const MAX: i64 = 9_999_999_999;

    pub fn is_valid(&self) -> bool {
        self.result > 0
    }
}
