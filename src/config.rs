/// Tunables left implementation-defined by the specification (§9):
/// the source this crate is modeled on hardcodes its decision cache size
/// and exposes no configuration for it. This crate surfaces that one knob.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuthConfig {
    /// Maximum number of memoized decisions kept per user. Must be >= 1000
    /// per the open question in §9; smaller values are accepted but logged.
    pub cache_capacity: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
        }
    }
}

impl AuthConfig {
    /// Builds a config with a specific cache capacity.
    pub fn with_cache_capacity(cache_capacity: usize) -> Self {
        if cache_capacity < 1000 {
            tracing::warn!(
                cache_capacity,
                "decision cache capacity below the recommended minimum of 1000"
            );
        }
        Self { cache_capacity }
    }
}
