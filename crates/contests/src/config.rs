/// Limits applied when validating a contest's structure
#[derive(Debug, Clone)]
pub struct ContestSettings {
    /// Maximum number of rounds an event may have
    pub max_rounds: usize,
}

impl Default for ContestSettings {
    fn default() -> Self {
        Self { max_rounds: 10 }
    }
}
