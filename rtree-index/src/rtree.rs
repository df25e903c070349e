use rtree_common::datatype::physical::BitsOrd;
use rtree_common::datatype::{Coordinate, Datatype};
use rtree_common::error::{Error, Result};

use crate::level::Level;
use crate::mbr::{Mbr, MbrView};
use crate::tile_overlap::TileOverlap;

/// A height-balanced, bottom-up constructed tree of MBRs with configurable
/// fanout (spec §3-§4). Immutable once built; a deep copy (`Clone`) is
/// fully independent of the original.
#[derive(Clone, Debug)]
pub struct RTree<T> {
    dim_num: usize,
    fanout: usize,
    /// `levels[0]` is the root, `levels[height()]` is the leaf level.
    levels: Vec<Level<T>>,
    /// `leaf_offsets[k][idx]` is the index of the first leaf covered by
    /// node `idx` at level `k`; `leaf_counts[k][idx]` is how many leaves
    /// that subtree actually spans. Exact, unlike the `subtree_leaf_num`
    /// estimate, and computed once at build time from the same grouping
    /// pass that builds the levels (spec §9's "over-counts for the
    /// right-most subtree" caveat applies only to the public estimate, not
    /// to this internal bookkeeping).
    leaf_offsets: Vec<Vec<usize>>,
    leaf_counts: Vec<Vec<usize>>,
}

impl<T: Coordinate> RTree<T> {
    /// Bulk-builds a tree from `mbrs`, which must already be sorted in the
    /// caller's desired tile order (spec §4.3). Fails with
    /// `InvalidArgument` if `fanout < 2`, `dim_num == 0`, any MBR's
    /// dimensionality mismatches, or any MBR violates `lo <= hi`. Fails
    /// with `Empty` if `mbrs` is empty.
    pub fn build(
        dim_num: usize,
        fanout: usize,
        mbrs: Vec<Mbr<T>>,
    ) -> Result<Self> {
        if dim_num == 0 {
            return Err(Error::invalid_argument("dim_num must be nonzero"));
        }
        if fanout < 2 {
            return Err(Error::invalid_argument(format!(
                "fanout must be at least 2, found {fanout}"
            )));
        }
        if mbrs.is_empty() {
            return Err(Error::Empty(
                "cannot build an r-tree from zero leaf mbrs".to_string(),
            ));
        }
        for (i, mbr) in mbrs.iter().enumerate() {
            if mbr.dim_num() != dim_num {
                return Err(Error::invalid_argument(format!(
                    "leaf mbr {i} has {} dimensions, expected {dim_num}",
                    mbr.dim_num()
                )));
            }
            let view = mbr.view();
            for d in 0..dim_num {
                if view.lo(d).bits_gt(&view.hi(d)) {
                    return Err(Error::invalid_argument(format!(
                        "leaf mbr {i} violates lo <= hi on dimension {d}"
                    )));
                }
            }
        }

        let leaf_num = mbrs.len();
        let mut levels = vec![Level::from_mbrs(dim_num, &mbrs)];
        let mut leaf_offsets = vec![(0..leaf_num).collect::<Vec<_>>()];
        let mut leaf_counts = vec![vec![1usize; leaf_num]];

        while levels.last().unwrap().mbr_num() > 1 {
            let current = levels.last().unwrap();
            let current_offsets = leaf_offsets.last().unwrap();
            let current_counts = leaf_counts.last().unwrap();

            let parent_num = current.mbr_num().div_ceil(fanout);
            let mut parent_mbrs = Vec::with_capacity(parent_num);
            let mut parent_offsets = Vec::with_capacity(parent_num);
            let mut parent_counts = Vec::with_capacity(parent_num);

            for chunk_start in (0..current.mbr_num()).step_by(fanout) {
                let chunk_end = (chunk_start + fanout).min(current.mbr_num());
                let mut union = current.mbr(chunk_start).to_owned_mbr();
                for child_idx in chunk_start + 1..chunk_end {
                    union = Mbr::union(&union.view(), &current.mbr(child_idx));
                }
                parent_mbrs.push(union);
                parent_offsets.push(current_offsets[chunk_start]);
                parent_counts.push(
                    current_counts[chunk_start..chunk_end].iter().sum(),
                );
            }

            levels.push(Level::from_mbrs(dim_num, &parent_mbrs));
            leaf_offsets.push(parent_offsets);
            leaf_counts.push(parent_counts);
        }

        levels.reverse();
        leaf_offsets.reverse();
        leaf_counts.reverse();

        let height = levels.len() - 1;
        tracing::debug!(
            dim_num,
            fanout,
            leaf_num,
            height,
            "built r-tree"
        );

        Ok(Self {
            dim_num,
            fanout,
            levels,
            leaf_offsets,
            leaf_counts,
        })
    }

    /// Reconstructs a tree from already-leveled MBR data plus the fanout
    /// it was originally built with (spec §6 `deserialize`). The fanout is
    /// not part of the serialized bytes; the caller supplies it, the same
    /// way they supply `D` and `T`.
    pub(crate) fn from_levels(
        dim_num: usize,
        fanout: usize,
        levels: Vec<Level<T>>,
    ) -> Result<Self> {
        if fanout < 2 {
            return Err(Error::invalid_argument(format!(
                "fanout must be at least 2, found {fanout}"
            )));
        }
        if levels.is_empty() {
            return Err(Error::Empty(
                "cannot reconstruct an r-tree with zero levels".to_string(),
            ));
        }
        if levels[0].mbr_num() != 1 {
            return Err(Error::internal(
                "root level must contain exactly one mbr",
            ));
        }

        let (leaf_offsets, leaf_counts) =
            compute_leaf_bookkeeping(&levels, fanout);

        Ok(Self {
            dim_num,
            fanout,
            levels,
            leaf_offsets,
            leaf_counts,
        })
    }

    pub fn dim_num(&self) -> usize {
        self.dim_num
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    pub fn datatype(&self) -> Datatype {
        T::DATATYPE
    }

    /// `H`, the leaf level index. `0` iff the tree has a single leaf.
    pub fn height(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn leaf_num(&self) -> usize {
        self.levels[self.height()].mbr_num()
    }

    pub fn root_mbr(&self) -> MbrView<'_, T> {
        self.levels[0].mbr(0)
    }

    pub fn leaf_mbr(&self, leaf_idx: usize) -> MbrView<'_, T> {
        self.levels[self.height()].mbr(leaf_idx)
    }

    pub(crate) fn levels(&self) -> &[Level<T>] {
        &self.levels
    }

    /// `F^(H-k)`: the full-subtree leaf count, used only for sizing
    /// estimates (spec §4.2, §9). Over-counts the right-most subtree when
    /// `N` is not a perfect power of `F`; callers needing an exact bound
    /// must use [`RTree::get_tile_overlap`] instead.
    pub fn subtree_leaf_num(&self, level: usize) -> u64 {
        let exponent = (self.height() - level) as u32;
        (self.fanout as u64).saturating_pow(exponent)
    }

    /// spec §4.2 `range_overlap_ratio`.
    pub fn range_overlap_ratio(
        &self,
        range: &MbrView<'_, T>,
        mbr: &MbrView<'_, T>,
    ) -> f64 {
        range.overlap_ratio(mbr)
    }

    /// spec §4.4: the tile overlap decomposition for `query`. Returns
    /// `InvalidArgument` if `query`'s dimensionality does not match the
    /// tree's.
    pub fn get_tile_overlap(&self, query: &Mbr<T>) -> Result<TileOverlap> {
        self.get_tile_overlap_strict(query, false)
    }

    /// Like [`RTree::get_tile_overlap`], but when `strict` is set, a
    /// partial tile whose overlap ratio had to be clamped due to `i128`
    /// volume overflow fails the whole call with `Error::Internal` instead
    /// of silently returning `1.0` (spec §2.1 Configuration
    /// `strict_overflow`).
    pub fn get_tile_overlap_strict(
        &self,
        query: &Mbr<T>,
        strict: bool,
    ) -> Result<TileOverlap> {
        if query.dim_num() != self.dim_num {
            return Err(Error::invalid_argument(format!(
                "query has {} dimensions, tree has {}",
                query.dim_num(),
                self.dim_num
            )));
        }

        let mut result = TileOverlap::default();
        let mut stack: Vec<Frame> = vec![Frame::Node { level: 0, idx: 0 }];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::FullSubtree { level, idx } => {
                    let first_leaf = self.leaf_offsets[level][idx];
                    let count = self.leaf_counts[level][idx];
                    result
                        .full_tiles
                        .extend(first_leaf..first_leaf + count);
                }
                Frame::Node { level, idx } => {
                    let node_mbr = self.levels[level].mbr(idx);
                    if !query.view().intersects(&node_mbr) {
                        continue;
                    }
                    if query.view().contains(&node_mbr) {
                        stack.push(Frame::FullSubtree { level, idx });
                        continue;
                    }
                    if level == self.height() {
                        let (ratio, saturated) =
                            query.view().overlap_ratio_with_saturation(&node_mbr);
                        if strict && saturated {
                            return Err(Error::internal(
                                "tile overlap ratio saturated its i128 volume accumulator",
                            ));
                        }
                        result.partial_tiles.push((idx, ratio));
                    } else {
                        let child_level = &self.levels[level + 1];
                        let first_child = idx * self.fanout;
                        let num_children =
                            self.fanout.min(child_level.mbr_num() - first_child);
                        for child in
                            (first_child..first_child + num_children).rev()
                        {
                            stack.push(Frame::Node {
                                level: level + 1,
                                idx: child,
                            });
                        }
                    }
                }
            }
        }

        Ok(result)
    }
}

enum Frame {
    Node { level: usize, idx: usize },
    FullSubtree { level: usize, idx: usize },
}

/// Computes, for every node in every level, the offset and length of the
/// leaf range it spans, from the level sizes alone (leaf level upward).
/// Shared by [`RTree::build`]'s bottom-up pass and
/// [`RTree::from_levels`] (used by deserialization), since both start from
/// a `levels` vector ordered root-first and a known `fanout`.
fn compute_leaf_bookkeeping<T>(
    levels: &[Level<T>],
    fanout: usize,
) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let height = levels.len() - 1;
    let mut offsets = vec![Vec::new(); levels.len()];
    let mut counts = vec![Vec::new(); levels.len()];

    let leaf_num = levels[height].mbr_num();
    offsets[height] = (0..leaf_num).collect();
    counts[height] = vec![1usize; leaf_num];

    for level in (0..height).rev() {
        let child_offsets = &offsets[level + 1];
        let child_counts = &counts[level + 1];
        let mbr_num = levels[level].mbr_num();

        let mut o = Vec::with_capacity(mbr_num);
        let mut c = Vec::with_capacity(mbr_num);
        for idx in 0..mbr_num {
            let start = idx * fanout;
            let end = (start + fanout).min(child_offsets.len());
            o.push(child_offsets[start]);
            c.push(child_counts[start..end].iter().sum());
        }
        offsets[level] = o;
        counts[level] = c;
    }

    (offsets, counts)
}
