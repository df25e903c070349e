//! Planner-wide knobs that are not per-query: a struct of optional fields
//! with a fluent builder and a `Default` matching documented defaults.

use rtree_common::layout::Layout;

/// Default fanout suggested to callers building a fresh index when they
/// have not measured a better value for their workload.
pub const DEFAULT_FANOUT_HINT: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannerConfig {
    fanout_hint: usize,
    strict_overflow: bool,
    default_layout: Layout,
}

impl PlannerConfig {
    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }

    pub fn fanout_hint(&self) -> usize {
        self.fanout_hint
    }

    /// When `true`, a saturated volume accumulator (spec §4.1) is surfaced
    /// as `Error::Internal` instead of being clamped to `1.0` with a
    /// warning. Off by default: the source engine never hard-fails on
    /// this condition.
    pub fn strict_overflow(&self) -> bool {
        self.strict_overflow
    }

    pub fn default_layout(&self) -> Layout {
        self.default_layout
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            fanout_hint: DEFAULT_FANOUT_HINT,
            strict_overflow: false,
            default_layout: Layout::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlannerConfigBuilder {
    fanout_hint: Option<usize>,
    strict_overflow: Option<bool>,
    default_layout: Option<Layout>,
}

impl PlannerConfigBuilder {
    pub fn fanout_hint(mut self, fanout_hint: usize) -> Self {
        self.fanout_hint = Some(fanout_hint);
        self
    }

    pub fn strict_overflow(mut self, strict_overflow: bool) -> Self {
        self.strict_overflow = Some(strict_overflow);
        self
    }

    pub fn default_layout(mut self, default_layout: Layout) -> Self {
        self.default_layout = Some(default_layout);
        self
    }

    pub fn build(self) -> PlannerConfig {
        let defaults = PlannerConfig::default();
        PlannerConfig {
            fanout_hint: self.fanout_hint.unwrap_or(defaults.fanout_hint),
            strict_overflow: self.strict_overflow.unwrap_or(defaults.strict_overflow),
            default_layout: self.default_layout.unwrap_or(defaults.default_layout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let config = PlannerConfig::default();
        assert_eq!(config.fanout_hint(), DEFAULT_FANOUT_HINT);
        assert!(!config.strict_overflow());
        assert_eq!(config.default_layout(), Layout::RowMajor);
    }

    #[test]
    fn builder_overrides_selected_fields() {
        let config = PlannerConfig::builder().strict_overflow(true).build();
        assert!(config.strict_overflow());
        assert_eq!(config.fanout_hint(), DEFAULT_FANOUT_HINT);
    }
}
