//! Data-graph selectors.

/// Chooses which blocks below a root belong to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Selector {
    /// The root and every block reachable from it.
    #[default]
    ExploreAll,
    /// Blocks at most this many links below the root. Depth 0 is the root alone.
    ExploreDepth(u32),
    /// No blocks at all.
    Nothing,
}

impl Selector {
    /// Whether blocks at `depth` are selected.
    pub const fn selects(&self, depth: u32) -> bool {
        match self {
            Self::ExploreAll => true,
            Self::ExploreDepth(max) => depth <= *max,
            Self::Nothing => false,
        }
    }
}
