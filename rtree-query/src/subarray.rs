//! The query region: per-dimension range lists whose Cartesian product is
//! the set of cells a query reads (spec §4.5).

use itertools::Itertools;

use rtree_common::datatype::physical::BitsOrd;
use rtree_common::datatype::Coordinate;
use rtree_common::error::{Error, Result};
use rtree_common::layout::Layout;
use rtree_common::range::Range;

use rtree_index::{Mbr, RTree};

use crate::attribute::AttributeCellSize;

/// A query region over a `dim_num`-dimensional domain: one ordered list of
/// ranges per dimension. An empty list on a dimension means "the full
/// domain interval on that dim" (spec §3).
///
/// Ranges on the same dimension are never deduplicated by `add_range`; the
/// Cartesian product may therefore cover the same cell more than once,
/// matching the source engine's observable behavior (spec §9 Open
/// Questions).
#[derive(Clone, Debug)]
pub struct Subarray<T> {
    domain: Vec<Range<T>>,
    ranges: Vec<Vec<Range<T>>>,
}

impl<T: Coordinate> Subarray<T> {
    /// `domain[i]` is dimension `i`'s full extent. Fails `InvalidArgument`
    /// if `domain` is empty.
    pub fn new(domain: Vec<Range<T>>) -> Result<Self> {
        if domain.is_empty() {
            return Err(Error::invalid_argument(
                "subarray domain must have at least one dimension",
            ));
        }
        let ranges = vec![Vec::new(); domain.len()];
        Ok(Self { domain, ranges })
    }

    pub fn dim_num(&self) -> usize {
        self.domain.len()
    }

    /// Appends `[lo, hi]` to dimension `dim`'s range list (spec §4.5).
    ///
    /// Fails `InvalidArgument` if `lo > hi` or `dim` is out of bounds.
    /// Fails `OutOfDomain` if the range lies wholly outside
    /// `domain[dim]` (spec §8 scenario 6: detected here, at configuration
    /// time, never at submit). A range that partially overlaps the domain
    /// is clamped to it on the permissive side before being stored.
    pub fn add_range(&mut self, dim: usize, lo: T, hi: T) -> Result<()> {
        let domain = *self.domain.get(dim).ok_or_else(|| {
            Error::invalid_argument(format!(
                "dimension {dim} is out of range for a {}-dimensional subarray",
                self.dim_num()
            ))
        })?;
        let requested = Range::new(lo, hi)?;
        let clamped = requested.clamped_to(&domain).ok_or_else(|| {
            Error::OutOfDomain(format!(
                "range [{lo:?}, {hi:?}] on dimension {dim} lies entirely outside the domain"
            ))
        })?;
        self.ranges[dim].push(clamped);
        Ok(())
    }

    pub fn range_num(&self, dim: usize) -> usize {
        if self.ranges[dim].is_empty() {
            1
        } else {
            self.ranges[dim].len()
        }
    }

    pub fn range(&self, dim: usize, j: usize) -> Option<Range<T>> {
        if self.ranges[dim].is_empty() {
            (j == 0).then_some(self.domain[dim])
        } else {
            self.ranges[dim].get(j).copied()
        }
    }

    /// Merges overlapping (including boundary-touching) ranges on `dim`
    /// into their union, sorted ascending by `lo`. An explicit, caller-
    /// invoked opt-in; `add_range` never does this implicitly (spec §4.5,
    /// §9 Open Questions — see the design ledger for why duplicates are
    /// preserved by default).
    pub fn coalesce_ranges(&mut self, dim: usize) -> Result<()> {
        let ranges = self.ranges.get_mut(dim).ok_or_else(|| {
            Error::invalid_argument(format!(
                "dimension {dim} is out of range for a {}-dimensional subarray",
                self.domain.len()
            ))
        })?;
        if ranges.len() < 2 {
            return Ok(());
        }
        ranges.sort_by(|a, b| a.lo().bits_cmp(&b.lo()));

        let mut merged: Vec<Range<T>> = Vec::with_capacity(ranges.len());
        for &next in ranges.iter() {
            match merged.last_mut() {
                Some(last) if last.intersects(&next) => {
                    *last = last.union(&next);
                }
                _ => merged.push(next),
            }
        }
        *ranges = merged;
        Ok(())
    }

    /// The Cartesian-product sub-ranges, each as one query MBR, ordered
    /// per `layout` (spec §4.5, §5 Ordering guarantees).
    ///
    /// `RowMajor` sorts lexicographically over dimension index (the last
    /// dimension varies fastest); `ColMajor` reverses that comparison.
    /// `GlobalOrder` and `Unordered` preserve construction order here: the
    /// exact index leaf order `GlobalOrder` calls for can only be resolved
    /// once tiles are actually visited, which [`crate::query::Query`] does
    /// downstream of this enumeration (each sub-range's own tile list is
    /// already leaf-index ascending, per [`RTree::get_tile_overlap`]).
    pub fn ordered_sub_ranges(&self, layout: Layout) -> Vec<Mbr<T>> {
        let index_lists: Vec<Vec<usize>> =
            (0..self.dim_num()).map(|dim| (0..self.range_num(dim)).collect()).collect();

        let mut combinations: Vec<Vec<usize>> = index_lists
            .into_iter()
            .multi_cartesian_product()
            .collect();

        match layout {
            Layout::RowMajor => {}
            Layout::ColMajor => {
                combinations.sort_by(|a, b| {
                    a.iter().rev().cmp(b.iter().rev())
                });
            }
            Layout::GlobalOrder | Layout::Unordered => {}
        }

        combinations
            .into_iter()
            .map(|indices| self.combination_to_mbr(&indices))
            .collect()
    }

    fn combination_to_mbr(&self, indices: &[usize]) -> Mbr<T> {
        let pairs: Vec<(T, T)> = indices
            .iter()
            .enumerate()
            .map(|(dim, &j)| {
                let r = self.range(dim, j).expect("combination index in range");
                (r.lo(), r.hi())
            })
            .collect();
        Mbr::from_pairs(&pairs)
    }

    /// spec §4.5 `est_result_size`: sum, over every Cartesian sub-range, of
    /// `Σ cells_per_tile(full) + Σ cells_per_tile(partial) * ratio`,
    /// scaled by `attr_size`'s per-cell byte estimate. Conservative for
    /// variable-sized attributes; never an exactness guarantee (spec §8).
    pub fn est_result_size(
        &self,
        rtree: &RTree<T>,
        attr_size: AttributeCellSize,
        cells_per_tile: impl Fn(usize) -> u64,
    ) -> Result<u64> {
        let mut total_cells = 0.0f64;
        for sub_range in self.ordered_sub_ranges(Layout::Unordered) {
            let overlap = rtree.get_tile_overlap(&sub_range)?;
            for &leaf_idx in &overlap.full_tiles {
                total_cells += cells_per_tile(leaf_idx) as f64;
            }
            for &(leaf_idx, ratio) in &overlap.partial_tiles {
                total_cells += cells_per_tile(leaf_idx) as f64 * ratio;
            }
        }
        Ok((total_cells * attr_size.estimate_bytes() as f64).ceil() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domain_2d() -> Subarray<i32> {
        Subarray::new(vec![
            Range::new(0, 3).unwrap(),
            Range::new(0, 3).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn default_range_is_full_domain() {
        let s = domain_2d();
        assert_eq!(s.range_num(0), 1);
        assert_eq!(s.range(0, 0), Some(Range::new(0, 3).unwrap()));
    }

    #[test]
    fn add_range_clamps_partial_overlap() {
        let mut s = domain_2d();
        s.add_range(0, -5, 1).unwrap();
        assert_eq!(s.range(0, 0), Some(Range::new(0, 1).unwrap()));
    }

    #[test]
    fn add_range_rejects_wholly_outside_domain() {
        let mut s = domain_2d();
        assert!(s.add_range(0, 10, 20).is_err());
    }

    #[test]
    fn add_range_preserves_duplicates_by_default() {
        let mut s = domain_2d();
        s.add_range(0, 0, 0).unwrap();
        s.add_range(0, 0, 1).unwrap();
        assert_eq!(s.range_num(0), 2);
    }

    #[test]
    fn coalesce_ranges_merges_overlap() {
        let mut s = domain_2d();
        s.add_range(0, 0, 2).unwrap();
        s.add_range(0, 1, 3).unwrap();
        s.coalesce_ranges(0).unwrap();
        assert_eq!(s.range_num(0), 1);
        assert_eq!(s.range(0, 0), Some(Range::new(0, 3).unwrap()));
    }

    #[test]
    fn cartesian_product_enumerates_every_combination() {
        let mut s = domain_2d();
        s.add_range(0, 0, 0).unwrap();
        s.add_range(0, 2, 2).unwrap();
        s.add_range(1, 0, 0).unwrap();
        s.add_range(1, 2, 2).unwrap();
        let combos = s.ordered_sub_ranges(Layout::RowMajor);
        assert_eq!(combos.len(), 4);
    }

    proptest! {
        #[test]
        fn sub_range_count_matches_product_of_per_dim_counts(
            ranges_dim0 in 1usize..4, ranges_dim1 in 1usize..4,
        ) {
            let mut s = domain_2d();
            for i in 0..ranges_dim0 {
                s.add_range(0, i as i32, i as i32).unwrap();
            }
            for i in 0..ranges_dim1 {
                s.add_range(1, i as i32, i as i32).unwrap();
            }
            let combos = s.ordered_sub_ranges(Layout::RowMajor);
            prop_assert_eq!(combos.len(), ranges_dim0 * ranges_dim1);
        }

        #[test]
        fn row_major_and_col_major_enumerate_the_same_set(
            ranges_dim0 in 1usize..4, ranges_dim1 in 1usize..4,
        ) {
            let mut s = domain_2d();
            for i in 0..ranges_dim0 {
                s.add_range(0, i as i32, i as i32).unwrap();
            }
            for i in 0..ranges_dim1 {
                s.add_range(1, i as i32, i as i32).unwrap();
            }
            let mut row_major: Vec<_> = s
                .ordered_sub_ranges(Layout::RowMajor)
                .into_iter()
                .map(|m| m.as_flat_coords().to_vec())
                .collect();
            let mut col_major: Vec<_> = s
                .ordered_sub_ranges(Layout::ColMajor)
                .into_iter()
                .map(|m| m.as_flat_coords().to_vec())
                .collect();
            row_major.sort();
            col_major.sort();
            prop_assert_eq!(row_major, col_major);
        }
    }
}
