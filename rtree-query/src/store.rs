use std::collections::HashMap;

use rtree_common::datatype::Coordinate;
use rtree_common::error::{Error, Result};

use crate::attribute::AttributeCellSize;

/// One decoded cell: its coordinate in the index's domain, and its value
/// for the attribute currently being read. Decoding, compression, and
/// filters are the storage layer's job (spec §1's "treated as
/// collaborators"); by the time a [`TileStore`] hands a cell to the
/// planner, it is already a plain value.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell<T, V> {
    pub coord: Vec<T>,
    pub value: V,
}

impl<T, V> Cell<T, V> {
    pub fn new(coord: Vec<T>, value: V) -> Self {
        Self { coord, value }
    }
}

/// The seam between the query planner and the (out-of-scope) storage
/// layer (spec §6 "To the storage layer (inbound)").
///
/// `fetch_leaf_tile` is synchronous; I/O errors surface to the caller as
/// `Error::IoError`, which the planner turns into `QueryStatus::Failed`
/// without retrying (spec §7).
pub trait TileStore<T, V> {
    fn fetch_leaf_tile(&self, leaf_idx: usize) -> Result<Vec<Cell<T, V>>>;
    fn cells_per_tile(&self, leaf_idx: usize) -> u64;
    fn attribute_cell_size(&self, attr: &str) -> AttributeCellSize;
}

/// An in-memory [`TileStore`] test double, keyed by leaf tile index. There
/// is no on-disk format in scope at all, so a plain map stands in for one.
///
/// A tile's dense capacity (the number of cells it has room for, sparse or
/// not) is tracked separately from the cells actually stored in it: a
/// sparse tile can hold far fewer live cells than its capacity, and
/// `est_result_size`'s conservativeness (spec §4.5) depends on
/// `cells_per_tile` reporting that capacity, not the live count.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTileStore<T, V> {
    tiles: HashMap<usize, Vec<Cell<T, V>>>,
    tile_capacities: HashMap<usize, u64>,
    attribute_sizes: HashMap<String, AttributeCellSize>,
}

impl<T: Coordinate, V: Clone> InMemoryTileStore<T, V> {
    pub fn new() -> Self {
        Self {
            tiles: HashMap::new(),
            tile_capacities: HashMap::new(),
            attribute_sizes: HashMap::new(),
        }
    }

    /// Stores `cells` under `leaf_idx`. The tile's capacity defaults to
    /// `cells.len()` (a fully-dense tile); call [`Self::with_tile_capacity`]
    /// afterward to declare a larger, sparsely-populated tile.
    pub fn with_tile(mut self, leaf_idx: usize, cells: Vec<Cell<T, V>>) -> Self {
        self.tile_capacities.entry(leaf_idx).or_insert(cells.len() as u64);
        self.tiles.insert(leaf_idx, cells);
        self
    }

    /// Declares `leaf_idx`'s dense cell capacity, independent of how many
    /// cells are actually stored in it (spec §4.5 `est_result_size`).
    pub fn with_tile_capacity(mut self, leaf_idx: usize, capacity: u64) -> Self {
        self.tile_capacities.insert(leaf_idx, capacity);
        self
    }

    pub fn with_attribute_size(
        mut self,
        attr: impl Into<String>,
        size: AttributeCellSize,
    ) -> Self {
        self.attribute_sizes.insert(attr.into(), size);
        self
    }
}

impl<T: Coordinate, V: Clone> TileStore<T, V> for InMemoryTileStore<T, V> {
    fn fetch_leaf_tile(&self, leaf_idx: usize) -> Result<Vec<Cell<T, V>>> {
        self.tiles.get(&leaf_idx).cloned().ok_or_else(|| {
            Error::IoError(format!("no such leaf tile: {leaf_idx}"))
        })
    }

    fn cells_per_tile(&self, leaf_idx: usize) -> u64 {
        self.tile_capacities.get(&leaf_idx).copied().unwrap_or(0)
    }

    fn attribute_cell_size(&self, attr: &str) -> AttributeCellSize {
        self.attribute_sizes.get(attr).copied().unwrap_or_default()
    }
}
