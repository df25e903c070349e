//! The incomplete-result query state machine (spec §4.6).
//!
//! A [`Query`] walks the Cartesian product of a [`Subarray`]'s ranges in
//! layout order, decodes leaf tiles through a [`TileStore`], and copies
//! cells into caller-supplied bounded buffers until either the query
//! completes or a buffer fills.

use std::collections::HashMap;

use stdx_binary_search::{Bisect, Search};

use rtree_common::datatype::Coordinate;
use rtree_common::error::Error;
use rtree_common::layout::Layout;

use rtree_index::{Mbr, RTree};

use crate::config::PlannerConfig;
use crate::store::{Cell, TileStore};
use crate::subarray::Subarray;

/// `UNINITIALIZED -> IN_PROGRESS -> {INCOMPLETE, COMPLETE, FAILED}` (spec
/// §4.6). From `Incomplete`, calling [`Query::submit`] again re-enters
/// `InProgress`.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryStatus {
    Uninitialized,
    InProgress,
    Incomplete,
    Complete,
    Failed(Error),
}

/// One caller-supplied output buffer: a byte capacity (spec §6's
/// `(ptr, capacity)` pair, minus the raw pointer this crate has no business
/// holding) plus the cells copied into it so far this `submit`.
#[derive(Clone, Debug, Default)]
struct BufferSlot<V> {
    capacity_bytes: u64,
    bytes_written: u64,
    values: Vec<V>,
}

impl<V> BufferSlot<V> {
    fn remaining_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.bytes_written)
    }
}

/// The largest `n <= num_available` such that `n` cells at `cost_bytes`
/// each still fit in `remaining_bytes`, found by bisecting a monotonic
/// "fits" predicate (`stdx_binary_search::Search::upper_bound`) rather than
/// walking cell-by-cell.
fn max_cells_fitting(
    num_available: usize,
    remaining_bytes: u64,
    cost_bytes: u64,
) -> usize {
    if cost_bytes == 0 {
        return num_available;
    }
    let fits = |n: &usize| (*n as u64).saturating_mul(cost_bytes) <= remaining_bytes;
    match (0..num_available + 1).upper_bound(fits) {
        Bisect::AlwaysTrue => num_available,
        Bisect::NeverTrue => 0,
        Bisect::UpperBound(n) => n,
    }
}

/// Resumable position within the enumerated query: which Cartesian
/// sub-range, which tile within it, which cell within that tile (spec
/// §4.6 Cursor).
#[derive(Clone, Copy, Debug, Default)]
struct Cursor {
    prod_cursor: usize,
    tile_cursor: usize,
    cell_cursor: usize,
}

/// A query against one [`RTree`] and [`TileStore`], reading into
/// per-attribute buffers that all observe the same decoded cell stream (a
/// single `V` stands in for "whichever attribute was fetched"; genuinely
/// heterogeneous per-attribute types are outside what a single
/// monomorphized `Query<T, V, S>` can express and are left to a higher
/// dynamically-typed layer, same as the rest of this crate's datatype
/// dispatch).
pub struct Query<T, V, S> {
    rtree: RTree<T>,
    store: S,
    subarray: Option<Subarray<T>>,
    layout: Layout,
    config: PlannerConfig,
    status: QueryStatus,
    cancelled: bool,
    buffers: HashMap<String, BufferSlot<V>>,
    cursor: Cursor,
    enumeration: Vec<EnumeratedSubRange<T>>,
    current_tile_cells: Vec<Cell<T, V>>,
    current_tile_key: Option<(usize, usize)>,
}

struct EnumeratedSubRange<T> {
    query_mbr: Mbr<T>,
    tiles: Vec<(usize, f64)>,
}

impl<T: Coordinate, V: Clone, S: TileStore<T, V>> Query<T, V, S> {
    pub fn new(rtree: RTree<T>, store: S) -> Self {
        Self::with_config(rtree, store, PlannerConfig::default())
    }

    /// Like [`Query::new`], but seeded from a [`PlannerConfig`]: the
    /// initial layout comes from `config.default_layout()` (still
    /// overridable via [`Query::set_layout`]), and `config.strict_overflow()`
    /// governs whether a saturated tile overlap ratio fails the query
    /// instead of being clamped.
    pub fn with_config(rtree: RTree<T>, store: S, config: PlannerConfig) -> Self {
        Self {
            rtree,
            store,
            subarray: None,
            layout: config.default_layout(),
            config,
            status: QueryStatus::Uninitialized,
            cancelled: false,
            buffers: HashMap::new(),
            cursor: Cursor::default(),
            enumeration: Vec::new(),
            current_tile_cells: Vec::new(),
            current_tile_key: None,
        }
    }

    /// Fails `InvalidArgument` if `subarray`'s dimensionality does not match
    /// the index's; `OutOfDomain` is already raised earlier, at
    /// `Subarray::add_range` time. Either way the error surfaces here, at
    /// configuration time, never during `submit` (spec §7 Propagation
    /// policy).
    pub fn set_subarray(&mut self, subarray: Subarray<T>) -> rtree_common::error::Result<()> {
        if subarray.dim_num() != self.rtree.dim_num() {
            return Err(Error::invalid_argument(format!(
                "subarray has {} dimensions but the index has {}",
                subarray.dim_num(),
                self.rtree.dim_num()
            )));
        }
        self.subarray = Some(subarray);
        self.status = QueryStatus::Uninitialized;
        self.enumeration.clear();
        self.cursor = Cursor::default();
        self.current_tile_cells.clear();
        self.current_tile_key = None;
        Ok(())
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    /// Registers (or resizes) the output buffer for `attr`, sized in bytes
    /// (spec §6 `set_buffer(attr, ptr, capacity)`).
    pub fn set_buffer(&mut self, attr: impl Into<String>, capacity_bytes: u64) {
        self.buffers.insert(
            attr.into(),
            BufferSlot {
                capacity_bytes,
                bytes_written: 0,
                values: Vec::new(),
            },
        );
    }

    /// spec §5 Cancellation: takes effect at the next cursor advance, not
    /// mid-copy; in-flight copies complete, no rollback on buffers already
    /// filled.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn status(&self) -> &QueryStatus {
        &self.status
    }

    /// spec §6 `result_buffer_elements`: per attribute, `(offsets_len,
    /// values_len)`, both equal to the number of cells copied into that
    /// buffer during the most recent `submit` (this crate does not model
    /// per-attribute variable-length value counts distinctly).
    pub fn result_buffer_elements(&self) -> HashMap<String, (u64, u64)> {
        self.buffers
            .iter()
            .map(|(attr, slot)| {
                let n = slot.values.len() as u64;
                (attr.clone(), (n, n))
            })
            .collect()
    }

    pub fn est_result_size(&self, attr: &str) -> rtree_common::error::Result<u64> {
        let subarray = self.subarray.as_ref().ok_or_else(|| {
            Error::invalid_argument("est_result_size requires set_subarray first")
        })?;
        let size = self.store.attribute_cell_size(attr);
        subarray.est_result_size(&self.rtree, size, |leaf_idx| {
            self.store.cells_per_tile(leaf_idx)
        })
    }

    /// Drains the buffer contents accumulated so far (for tests and for
    /// callers that want owned results rather than re-reading buffers).
    pub fn take_buffer(&mut self, attr: &str) -> Vec<V> {
        self.buffers
            .get_mut(attr)
            .map(|slot| std::mem::take(&mut slot.values))
            .unwrap_or_default()
    }

    /// spec §4.6 `submit`. Returns the new status; `Failed` is a terminal
    /// state carrying the error, not a Rust `Result::Err` — matching the
    /// spec's framing of failure as one more state of the query.
    pub fn submit(&mut self) -> QueryStatus {
        if matches!(self.status, QueryStatus::Complete | QueryStatus::Failed(_)) {
            return self.status.clone();
        }

        let costs: HashMap<String, u64> = self
            .buffers
            .keys()
            .map(|attr| (attr.clone(), self.store.attribute_cell_size(attr).estimate_bytes() as u64))
            .collect();

        if self.buffers.iter().any(|(attr, slot)| {
            let cost = costs[attr];
            cost > 0 && slot.capacity_bytes < cost
        }) {
            self.status = QueryStatus::Failed(Error::BufferTooSmall(
                "a registered buffer cannot hold even a single cell".to_string(),
            ));
            return self.status.clone();
        }

        if matches!(self.status, QueryStatus::Uninitialized) {
            if let Err(err) = self.initialize_enumeration() {
                self.status = QueryStatus::Failed(err);
                return self.status.clone();
            }
        }

        // reset per-call buffer contents: result_buffer_elements reports
        // what this submit wrote, not a running total.
        for slot in self.buffers.values_mut() {
            slot.values.clear();
            slot.bytes_written = 0;
        }

        self.status = QueryStatus::InProgress;

        loop {
            if self.cancelled {
                self.status = QueryStatus::Failed(Error::Cancelled);
                return self.status.clone();
            }

            if self.cursor.prod_cursor >= self.enumeration.len() {
                self.status = QueryStatus::Complete;
                return self.status.clone();
            }

            let tiles_len = self.enumeration[self.cursor.prod_cursor].tiles.len();
            if self.cursor.tile_cursor >= tiles_len {
                self.cursor.prod_cursor += 1;
                self.cursor.tile_cursor = 0;
                self.cursor.cell_cursor = 0;
                self.current_tile_key = None;
                continue;
            }

            let key = (self.cursor.prod_cursor, self.cursor.tile_cursor);
            if self.current_tile_key != Some(key) {
                match self.load_tile_cells(key) {
                    Ok(cells) => {
                        self.current_tile_cells = cells;
                        self.current_tile_key = Some(key);
                    }
                    Err(err) => {
                        self.status = QueryStatus::Failed(err);
                        return self.status.clone();
                    }
                }
            }

            if self.cursor.cell_cursor >= self.current_tile_cells.len() {
                self.cursor.tile_cursor += 1;
                self.cursor.cell_cursor = 0;
                self.current_tile_key = None;
                continue;
            }

            let available = self.current_tile_cells.len() - self.cursor.cell_cursor;
            let batch = self
                .buffers
                .iter()
                .map(|(attr, slot)| {
                    max_cells_fitting(available, slot.remaining_bytes(), costs[attr])
                })
                .min()
                .unwrap_or(available);

            if batch == 0 {
                self.status = QueryStatus::Incomplete;
                return self.status.clone();
            }

            for offset in 0..batch {
                let value =
                    self.current_tile_cells[self.cursor.cell_cursor + offset].value.clone();
                for (attr, slot) in self.buffers.iter_mut() {
                    slot.values.push(value.clone());
                    slot.bytes_written += costs[attr];
                }
            }
            self.cursor.cell_cursor += batch;
        }
    }

    fn initialize_enumeration(&mut self) -> rtree_common::error::Result<()> {
        let subarray = self.subarray.as_ref().ok_or_else(|| {
            Error::invalid_argument("submit requires set_subarray first")
        })?;

        let mut enumeration = Vec::new();
        for query_mbr in subarray.ordered_sub_ranges(self.layout) {
            let overlap = self
                .rtree
                .get_tile_overlap_strict(&query_mbr, self.config.strict_overflow())?;
            enumeration.push(EnumeratedSubRange {
                query_mbr,
                tiles: overlap.merged_ascending(),
            });
        }
        self.enumeration = enumeration;
        Ok(())
    }

    fn load_tile_cells(
        &self,
        key: (usize, usize),
    ) -> rtree_common::error::Result<Vec<Cell<T, V>>> {
        let sub_range = &self.enumeration[key.0];
        let (leaf_idx, _ratio) = sub_range.tiles[key.1];

        let mut cells = self.store.fetch_leaf_tile(leaf_idx)?;
        cells.retain(|cell| sub_range.query_mbr.view().contains_point(&cell.coord));

        match self.layout {
            Layout::RowMajor => cells.sort_by(|a, b| cmp_coords(&a.coord, &b.coord)),
            Layout::ColMajor => {
                cells.sort_by(|a, b| cmp_coords_rev(&a.coord, &b.coord))
            }
            Layout::GlobalOrder | Layout::Unordered => {}
        }

        Ok(cells)
    }
}

fn cmp_coords<T: Coordinate>(a: &[T], b: &[T]) -> std::cmp::Ordering {
    use rtree_common::datatype::physical::BitsOrd;
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.bits_cmp(y);
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

fn cmp_coords_rev<T: Coordinate>(a: &[T], b: &[T]) -> std::cmp::Ordering {
    use rtree_common::datatype::physical::BitsOrd;
    for (x, y) in a.iter().zip(b.iter()).rev() {
        let ord = x.bits_cmp(y);
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeCellSize;
    use crate::store::InMemoryTileStore;
    use proptest::prelude::*;
    use rtree_common::range::Range;

    fn grid_store() -> InMemoryTileStore<i32, i64> {
        // 4x4 domain, one leaf tile per cell, so leaf index == row*4+col.
        // attribute "a" costs 1 byte/cell so the byte-capacity buffers used
        // below double as plain cell-count buffers.
        let mut store = InMemoryTileStore::new()
            .with_attribute_size("a", AttributeCellSize::Fixed(1));
        for row in 0..4 {
            for col in 0..4 {
                let leaf_idx = (row * 4 + col) as usize;
                let value = (row * 4 + col + 1) as i64;
                store = store.with_tile(
                    leaf_idx,
                    vec![Cell::new(vec![row, col], value)],
                );
            }
        }
        store
    }

    fn grid_tree() -> RTree<i32> {
        let mut leaves = Vec::new();
        for row in 0..4 {
            for col in 0..4 {
                leaves.push(Mbr::from_pairs(&[(row, row), (col, col)]));
            }
        }
        RTree::build(2, 4, leaves).unwrap()
    }

    fn domain() -> Subarray<i32> {
        Subarray::new(vec![
            Range::new(0, 3).unwrap(),
            Range::new(0, 3).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn single_cell_sparse_read() {
        // mirrors spec §8 scenario 1's range pattern (dense grid here, not sparse).
        let mut subarray = domain();
        subarray.add_range(0, 0, 0).unwrap();
        subarray.add_range(1, 0, 0).unwrap();

        let mut query = Query::new(grid_tree(), grid_store());
        query.set_subarray(subarray).unwrap();
        query.set_buffer("a", 16);
        let status = query.submit();
        assert_eq!(status, QueryStatus::Complete);
        assert_eq!(query.take_buffer("a"), vec![1]);
    }

    #[test]
    fn single_axis_aligned_range() {
        // mirrors spec §8 scenario 2's range pattern.
        let mut subarray = domain();
        subarray.add_range(0, 1, 2).unwrap();
        subarray.add_range(1, 1, 2).unwrap();

        let mut query = Query::new(grid_tree(), grid_store());
        query.set_subarray(subarray).unwrap();
        query.set_layout(Layout::RowMajor);
        query.set_buffer("a", 16);
        let status = query.submit();
        assert_eq!(status, QueryStatus::Complete);
        assert_eq!(query.take_buffer("a"), vec![6, 7, 10, 11]);
    }

    #[test]
    fn two_disjoint_point_ranges_cartesian() {
        // mirrors spec §8 scenario 3's range pattern (Cartesian product of point ranges).
        let mut subarray = domain();
        subarray.add_range(0, 0, 0).unwrap();
        subarray.add_range(0, 2, 2).unwrap();
        subarray.add_range(1, 0, 0).unwrap();
        subarray.add_range(1, 2, 2).unwrap();

        let mut query = Query::new(grid_tree(), grid_store());
        query.set_subarray(subarray).unwrap();
        query.set_buffer("a", 16);
        let status = query.submit();
        assert_eq!(status, QueryStatus::Complete);
        assert_eq!(query.take_buffer("a"), vec![1, 3, 9, 11]);
    }

    #[test]
    fn two_disjoint_intervals_full_cover() {
        // mirrors spec §8 scenario 4's range pattern (full cover via two disjoint intervals).
        let mut subarray = domain();
        subarray.add_range(0, 0, 1).unwrap();
        subarray.add_range(0, 2, 3).unwrap();
        subarray.add_range(1, 0, 1).unwrap();
        subarray.add_range(1, 2, 3).unwrap();

        let mut query = Query::new(grid_tree(), grid_store());
        query.set_subarray(subarray).unwrap();
        query.set_buffer("a", 64);
        let status = query.submit();
        assert_eq!(status, QueryStatus::Complete);
        let mut result = query.take_buffer("a");
        result.sort_unstable();
        assert_eq!(result, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn incompleteness_resumption_matches_unbounded_result() {
        let mut subarray = domain();
        subarray.add_range(0, 0, 3).unwrap();
        subarray.add_range(1, 0, 3).unwrap();

        let mut unbounded = Query::new(grid_tree(), grid_store());
        unbounded.set_subarray(Subarray::new(vec![
            Range::new(0, 3).unwrap(),
            Range::new(0, 3).unwrap(),
        ]).unwrap()).unwrap();
        unbounded.set_buffer("a", 64);
        assert_eq!(unbounded.submit(), QueryStatus::Complete);
        let full_result = unbounded.take_buffer("a");

        let mut bounded = Query::new(grid_tree(), grid_store());
        bounded.set_subarray(subarray).unwrap();
        bounded.set_buffer("a", 3);
        let mut accumulated = Vec::new();
        loop {
            let status = bounded.submit();
            accumulated.extend(bounded.take_buffer("a"));
            match status {
                QueryStatus::Incomplete => continue,
                QueryStatus::Complete => break,
                other => panic!("unexpected status {other:?}"),
            }
        }
        assert_eq!(accumulated, full_result);
    }

    #[test]
    fn set_subarray_rejects_dimension_mismatch_at_configuration_time() {
        let mut query = Query::new(grid_tree(), grid_store());
        let one_dim_subarray = Subarray::new(vec![Range::new(0, 3).unwrap()]).unwrap();
        match query.set_subarray(one_dim_subarray) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn zero_capacity_buffer_fails_fast() {
        let mut subarray = domain();
        subarray.add_range(0, 0, 0).unwrap();
        subarray.add_range(1, 0, 0).unwrap();

        let mut query = Query::new(grid_tree(), grid_store());
        query.set_subarray(subarray).unwrap();
        query.set_buffer("a", 0);
        match query.submit() {
            QueryStatus::Failed(Error::BufferTooSmall(_)) => {}
            other => panic!("expected BufferTooSmall, got {other:?}"),
        }
    }

    #[test]
    fn config_default_layout_seeds_initial_layout() {
        use crate::config::PlannerConfig;
        // same range pattern as two_disjoint_point_ranges_cartesian, whose
        // RowMajor result is [1, 3, 9, 11].
        let mut subarray = domain();
        subarray.add_range(0, 0, 0).unwrap();
        subarray.add_range(0, 2, 2).unwrap();
        subarray.add_range(1, 0, 0).unwrap();
        subarray.add_range(1, 2, 2).unwrap();

        let config = PlannerConfig::builder()
            .default_layout(Layout::ColMajor)
            .build();
        let mut query = Query::with_config(grid_tree(), grid_store(), config);
        query.set_subarray(subarray).unwrap();
        query.set_buffer("a", 16);
        assert_eq!(query.submit(), QueryStatus::Complete);
        // ColMajor walks the Cartesian product with dimension 0 varying
        // fastest, so the second and third sub-ranges swap vs. RowMajor.
        assert_eq!(query.take_buffer("a"), vec![1, 9, 3, 11]);
    }

    proptest! {
        #[test]
        fn resumption_matches_unbounded_result_for_any_buffer_size(capacity_bytes in 1u64..20) {
            let mut unbounded = Query::new(grid_tree(), grid_store());
            unbounded.set_subarray(domain()).unwrap();
            unbounded.set_buffer("a", 64);
            assert_eq!(unbounded.submit(), QueryStatus::Complete);
            let full_result = unbounded.take_buffer("a");

            let mut bounded = Query::new(grid_tree(), grid_store());
            bounded.set_subarray(domain()).unwrap();
            bounded.set_buffer("a", capacity_bytes);
            let mut accumulated = Vec::new();
            loop {
                match bounded.submit() {
                    QueryStatus::Incomplete => accumulated.extend(bounded.take_buffer("a")),
                    QueryStatus::Complete => {
                        accumulated.extend(bounded.take_buffer("a"));
                        break;
                    }
                    other => panic!("unexpected status {other:?}"),
                }
            }
            assert_eq!(accumulated, full_result);
        }
    }

    #[test]
    fn cancel_transitions_to_failed() {
        let mut subarray = domain();
        subarray.add_range(0, 0, 3).unwrap();
        subarray.add_range(1, 0, 3).unwrap();

        let mut query = Query::new(grid_tree(), grid_store());
        query.set_subarray(subarray).unwrap();
        query.set_buffer("a", 1);
        assert_eq!(query.submit(), QueryStatus::Incomplete);
        query.cancel();
        match query.submit() {
            QueryStatus::Failed(Error::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }
}
