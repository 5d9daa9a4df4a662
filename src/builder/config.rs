//! Construction-time configuration

use crate::layout::LayoutMode;
use crate::util::Log2;
use crate::ChtError;

/// Default branching factor per node.
pub const DEFAULT_NUM_BINS: usize = 64;

/// Default maximum error of a search bound.
pub const DEFAULT_MAX_ERROR: usize = 32;

/// Largest supported branching factor.
pub const MAX_NUM_BINS: usize = 1 << 30;

/// How keys are ingested before the tree is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BuildMode {
    /// Buffer every key, build breadth-first at finalize.
    #[default]
    Offline,

    /// Count keys into a shadow tree as they arrive; nothing is buffered.
    /// Requires explicit key bounds.
    SinglePass,
}

/// Validated index configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexConfig {
    num_bins: usize,
    log_num_bins: u32,
    max_error: usize,
    layout: LayoutMode,
    build_mode: BuildMode,
}

impl IndexConfig {
    /// Create a configuration; `num_bins` must be a power of two in
    /// `2..=MAX_NUM_BINS` and `max_error` at least 1.
    pub fn new(num_bins: usize, max_error: usize) -> Result<Self, ChtError> {
        if !num_bins.is_power_of_two() {
            return Err(ChtError::InvalidConfiguration(format!(
                "num_bins must be a power of two, got {}",
                num_bins
            )));
        }
        if !(2..=MAX_NUM_BINS).contains(&num_bins) {
            return Err(ChtError::InvalidConfiguration(format!(
                "num_bins must be in [2, {}], got {}",
                MAX_NUM_BINS, num_bins
            )));
        }
        if max_error == 0 {
            return Err(ChtError::InvalidConfiguration(
                "max_error must be > 0".to_string(),
            ));
        }
        let log_num_bins = num_bins.floor_log2().ok_or_else(|| {
            ChtError::InvalidConfiguration("num_bins must be > 0".to_string())
        })?;

        Ok(Self {
            num_bins,
            log_num_bins,
            max_error,
            layout: LayoutMode::default(),
            build_mode: BuildMode::default(),
        })
    }

    /// Like [`IndexConfig::new`], rounding `num_bins` up to a power of two.
    pub fn rounded(num_bins: usize, max_error: usize) -> Result<Self, ChtError> {
        let rounded = num_bins.max(2).round_up_pow2().ok_or_else(|| {
            ChtError::InvalidConfiguration(format!("num_bins {} is too large", num_bins))
        })?;
        Self::new(rounded, max_error)
    }

    /// Select the table layout.
    pub fn with_layout(mut self, layout: LayoutMode) -> Self {
        self.layout = layout;
        self
    }

    /// Select the build mode.
    pub fn with_build_mode(mut self, build_mode: BuildMode) -> Self {
        self.build_mode = build_mode;
        self
    }

    /// Bins per node.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// `log2(num_bins)`: key bits consumed per level.
    pub fn log_num_bins(&self) -> u32 {
        self.log_num_bins
    }

    /// Maximum error of a search bound.
    pub fn max_error(&self) -> usize {
        self.max_error
    }

    /// Table layout.
    pub fn layout(&self) -> LayoutMode {
        self.layout
    }

    /// Build mode.
    pub fn build_mode(&self) -> BuildMode {
        self.build_mode
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            num_bins: DEFAULT_NUM_BINS,
            log_num_bins: DEFAULT_NUM_BINS.trailing_zeros(),
            max_error: DEFAULT_MAX_ERROR,
            layout: LayoutMode::default(),
            build_mode: BuildMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_validated_config() {
        let validated = IndexConfig::new(DEFAULT_NUM_BINS, DEFAULT_MAX_ERROR).unwrap();
        assert_eq!(IndexConfig::default(), validated);
        assert_eq!(validated.log_num_bins(), 6);
    }

    #[test]
    fn test_rejects_non_power_of_two_bins() {
        assert!(matches!(
            IndexConfig::new(18, 32),
            Err(ChtError::InvalidConfiguration(_))
        ));
        assert!(IndexConfig::new(0, 32).is_err());
        assert!(IndexConfig::new(1, 32).is_err());
        assert!(IndexConfig::new(MAX_NUM_BINS * 2, 32).is_err());
    }

    #[test]
    fn test_rejects_zero_error() {
        assert!(IndexConfig::new(4, 0).is_err());
    }

    #[test]
    fn test_rounded_picks_next_power_of_two() {
        let config = IndexConfig::rounded(18, 32).unwrap();
        assert_eq!(config.num_bins(), 32);
        assert_eq!(config.log_num_bins(), 5);
        assert_eq!(IndexConfig::rounded(1, 8).unwrap().num_bins(), 2);
    }

    #[test]
    fn test_setters_override_modes() {
        let config = IndexConfig::new(16, 8)
            .unwrap()
            .with_layout(LayoutMode::CacheOblivious)
            .with_build_mode(BuildMode::SinglePass);
        assert_eq!(config.layout(), LayoutMode::CacheOblivious);
        assert_eq!(config.build_mode(), BuildMode::SinglePass);
        assert_eq!(config.num_bins(), 16);
    }
}
