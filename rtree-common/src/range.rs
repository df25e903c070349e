use crate::datatype::physical::BitsOrd;
use crate::datatype::Coordinate;
use crate::error::{Error, Result};

/// A closed interval `[lo, hi]` in a dimension's coordinate type (spec §3).
///
/// A `Range` where `lo == hi` is a point. Construction validates
/// `lo <= hi`; nothing downstream needs to re-check it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range<T> {
    lo: T,
    hi: T,
}

impl<T: Coordinate> Range<T> {
    pub fn new(lo: T, hi: T) -> Result<Self> {
        if lo.bits_gt(&hi) {
            return Err(Error::invalid_argument(format!(
                "range has lo > hi: [{lo:?}, {hi:?}]"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Constructs a range without validating `lo <= hi`. Used internally
    /// where the invariant is already established by the caller (e.g.
    /// clamping, MBR union) to avoid a redundant fallible path.
    pub(crate) fn new_unchecked(lo: T, hi: T) -> Self {
        debug_assert!(lo.bits_le(&hi));
        Self { lo, hi }
    }

    pub fn lo(&self) -> T {
        self.lo
    }

    pub fn hi(&self) -> T {
        self.hi
    }

    pub fn is_point(&self) -> bool {
        self.lo.bits_eq(&self.hi)
    }

    pub fn intersects(&self, other: &Range<T>) -> bool {
        self.hi.bits_ge(&other.lo) && other.hi.bits_ge(&self.lo)
    }

    pub fn contains(&self, other: &Range<T>) -> bool {
        self.lo.bits_le(&other.lo) && self.hi.bits_ge(&other.hi)
    }

    pub fn contains_point(&self, point: T) -> bool {
        self.lo.bits_le(&point) && self.hi.bits_ge(&point)
    }

    pub fn union(&self, other: &Range<T>) -> Range<T> {
        Range::new_unchecked(
            self.lo.coord_min(other.lo),
            self.hi.coord_max(other.hi),
        )
    }

    /// The overlap of `self` and `other`, or `None` if they do not
    /// intersect (spec §4.1 `overlap_mbr`, per-dimension).
    pub fn overlap(&self, other: &Range<T>) -> Option<Range<T>> {
        if !self.intersects(other) {
            return None;
        }
        Some(Range::new_unchecked(
            self.lo.coord_max(other.lo),
            self.hi.coord_min(other.hi),
        ))
    }

    /// Clamps `self` to lie within `domain`, per the permissive-clamp
    /// behavior of `Subarray::add_range` (spec §4.5). Returns `None` if the
    /// clamped range would be empty, i.e. `self` lies wholly outside
    /// `domain`.
    pub fn clamped_to(&self, domain: &Range<T>) -> Option<Range<T>> {
        let lo = self.lo.coord_max(domain.lo);
        let hi = self.hi.coord_min(domain.hi);
        if lo.bits_gt(&hi) {
            None
        } else {
            Some(Range::new_unchecked(lo, hi))
        }
    }
}
