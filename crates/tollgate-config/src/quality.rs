use serde::Deserialize;

/// Response quality scoring configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityConfig {
    /// Word count at which the length component saturates
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_tokens: default_min_tokens(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_min_tokens() -> usize {
    50
}
