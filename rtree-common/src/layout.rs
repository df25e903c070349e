/// The ordering convention requested for a query's results (spec §4.5, §5).
///
/// `Layout` governs two things: the order in which the Cartesian product of
/// per-dimension ranges is walked, and the order in which tiles within one
/// sub-range are emitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Layout {
    /// Lexicographic over dimension index, dimension 0 varying slowest.
    RowMajor,
    /// Lexicographic over dimension index, dimension 0 varying fastest.
    ColMajor,
    /// Traversal order must match the index's own leaf order exactly.
    GlobalOrder,
    /// Any order is acceptable, provided each `submit` makes forward
    /// progress; the implementation picks a fixed order for the query's
    /// lifetime.
    Unordered,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::RowMajor
    }
}
