use rtree_common::datatype::Coordinate;

use crate::mbr::{Mbr, MbrView};

/// A contiguous sequence of MBRs serialized in the flat
/// `lo_0,hi_0,...,lo_{D-1},hi_{D-1}` layout described in spec §3, plus a
/// count. Level 0 (the root) always has `mbr_num == 1`; level `H` (the
/// leaves) has `mbr_num == N`, the number of MBRs the tree was built from.
///
/// Ownership is unique to the level: children never alias a parent's
/// buffer (spec §9).
#[derive(Clone, Debug, PartialEq)]
pub struct Level<T> {
    dim_num: usize,
    mbr_num: usize,
    coords: Vec<T>,
}

impl<T: Coordinate> Level<T> {
    pub fn from_mbrs(dim_num: usize, mbrs: &[Mbr<T>]) -> Self {
        let mut coords = Vec::with_capacity(dim_num * 2 * mbrs.len());
        for mbr in mbrs {
            debug_assert_eq!(mbr.dim_num(), dim_num);
            coords.extend_from_slice(mbr.as_flat_coords());
        }
        Self {
            dim_num,
            mbr_num: mbrs.len(),
            coords,
        }
    }

    /// Reconstructs a level from its raw flat coordinates, as produced by
    /// [`crate::serialize::serialize`]. The caller supplies `dim_num` and
    /// `mbr_num`; this is purely a data-integrity check, not a rebuild.
    pub fn from_flat(
        dim_num: usize,
        mbr_num: usize,
        coords: Vec<T>,
    ) -> Option<Self> {
        if coords.len() != dim_num * 2 * mbr_num {
            return None;
        }
        Some(Self {
            dim_num,
            mbr_num,
            coords,
        })
    }

    pub fn dim_num(&self) -> usize {
        self.dim_num
    }

    pub fn mbr_num(&self) -> usize {
        self.mbr_num
    }

    pub fn mbr(&self, idx: usize) -> MbrView<'_, T> {
        let start = idx * self.dim_num * 2;
        let end = start + self.dim_num * 2;
        MbrView::new(&self.coords[start..end], self.dim_num)
    }

    pub fn as_flat_coords(&self) -> &[T] {
        &self.coords
    }

    pub fn iter(&self) -> impl Iterator<Item = MbrView<'_, T>> {
        (0..self.mbr_num).map(move |i| self.mbr(i))
    }
}
