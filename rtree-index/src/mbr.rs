use rtree_common::datatype::physical::BitsOrd;
use rtree_common::datatype::Coordinate;

/// An owned Minimum Bounding Rectangle: `D` closed intervals laid out flat
/// as `lo_0, hi_0, .., lo_{D-1}, hi_{D-1}` (spec §3).
///
/// The flat layout is preserved all the way down into [`crate::level::Level`]
/// storage for cache locality and zero-copy (de)serialization (spec §9); an
/// `Mbr` is simply the single-MBR case of that same layout, owned rather
/// than borrowed.
#[derive(Clone, Debug, PartialEq)]
pub struct Mbr<T> {
    dim_num: usize,
    coords: Vec<T>,
}

impl<T: Coordinate> Mbr<T> {
    /// Builds an MBR from `D` `(lo, hi)` pairs. Panics only on programmer
    /// error (mismatched dimension counts internal to this crate); public
    /// construction paths validate `lo <= hi` before reaching here.
    pub fn from_pairs(pairs: &[(T, T)]) -> Self {
        let dim_num = pairs.len();
        let mut coords = Vec::with_capacity(dim_num * 2);
        for &(lo, hi) in pairs {
            coords.push(lo);
            coords.push(hi);
        }
        Self { dim_num, coords }
    }

    pub fn dim_num(&self) -> usize {
        self.dim_num
    }

    pub fn view(&self) -> MbrView<'_, T> {
        MbrView {
            dim_num: self.dim_num,
            coords: &self.coords,
        }
    }

    pub fn as_flat_coords(&self) -> &[T] {
        &self.coords
    }

    /// The tight union of two MBRs (spec §4.1 `union`): per-dimension
    /// `[min(lo), max(hi)]`.
    pub fn union(a: &MbrView<'_, T>, b: &MbrView<'_, T>) -> Mbr<T> {
        assert_eq!(a.dim_num, b.dim_num);
        let mut coords = Vec::with_capacity(a.dim_num * 2);
        for i in 0..a.dim_num {
            coords.push(a.lo(i).coord_min(b.lo(i)));
            coords.push(a.hi(i).coord_max(b.hi(i)));
        }
        Mbr {
            dim_num: a.dim_num,
            coords,
        }
    }
}

/// A borrowed view of one MBR's coordinates inside a flat buffer (owned by
/// an [`Mbr`] or a [`crate::level::Level`]). All MBR geometry (intersects,
/// contains, volume, overlap ratio) is implemented once here, generically
/// over `T: Coordinate`.
#[derive(Clone, Copy, Debug)]
pub struct MbrView<'a, T> {
    dim_num: usize,
    coords: &'a [T],
}

impl<'a, T: Coordinate> MbrView<'a, T> {
    /// Constructs a view over exactly `2 * dim_num` coordinates.
    pub fn new(coords: &'a [T], dim_num: usize) -> Self {
        debug_assert_eq!(coords.len(), dim_num * 2);
        Self { dim_num, coords }
    }

    pub fn dim_num(&self) -> usize {
        self.dim_num
    }

    pub fn lo(&self, dim: usize) -> T {
        self.coords[dim * 2]
    }

    pub fn hi(&self, dim: usize) -> T {
        self.coords[dim * 2 + 1]
    }

    pub fn to_owned_mbr(&self) -> Mbr<T> {
        Mbr {
            dim_num: self.dim_num,
            coords: self.coords.to_vec(),
        }
    }

    /// spec §4.1 `intersects(A,B)`: for all `i`, `A.hi_i >= B.lo_i` and
    /// `B.hi_i >= A.lo_i`.
    pub fn intersects(&self, other: &MbrView<'_, T>) -> bool {
        (0..self.dim_num).all(|i| {
            self.hi(i).bits_ge(&other.lo(i)) && other.hi(i).bits_ge(&self.lo(i))
        })
    }

    /// spec §4.1 `contains(A,B)`: for all `i`, `A.lo_i <= B.lo_i` and
    /// `A.hi_i >= B.hi_i`.
    pub fn contains(&self, other: &MbrView<'_, T>) -> bool {
        (0..self.dim_num).all(|i| {
            self.lo(i).bits_le(&other.lo(i)) && self.hi(i).bits_ge(&other.hi(i))
        })
    }

    /// Whether `point` (one coordinate per dimension) lies inside this MBR,
    /// closed-interval per dimension. Used by the query planner to filter
    /// a partially-covered tile's cells down to the ones actually inside a
    /// sub-range (spec §4.6).
    pub fn contains_point(&self, point: &[T]) -> bool {
        debug_assert_eq!(point.len(), self.dim_num);
        (0..self.dim_num).all(|i| {
            self.lo(i).bits_le(&point[i]) && self.hi(i).bits_ge(&point[i])
        })
    }

    /// spec §4.1 `overlap_mbr(A,B)`: per-dim `[max(lo), min(hi)]`, defined
    /// only when `self` and `other` intersect.
    pub fn overlap(&self, other: &MbrView<'_, T>) -> Option<Mbr<T>> {
        if !self.intersects(other) {
            return None;
        }
        let mut coords = Vec::with_capacity(self.dim_num * 2);
        for i in 0..self.dim_num {
            coords.push(self.lo(i).coord_max(other.lo(i)));
            coords.push(self.hi(i).coord_min(other.hi(i)));
        }
        Some(Mbr {
            dim_num: self.dim_num,
            coords,
        })
    }

    /// spec §4.1 `volume(A)`. Integer types: product of
    /// `(hi_i - lo_i + 1)` with a 128-bit accumulator; returns
    /// `(value, saturated)` where `saturated` is set if the accumulator
    /// overflowed `i128`. Float types: product of `(hi_i - lo_i)`
    /// (half-open semantics), `0.0` if any extent is non-positive.
    pub fn volume(&self) -> Volume {
        if T::DATATYPE.is_integral() {
            let mut acc: i128 = 1;
            let mut saturated = false;
            for i in 0..self.dim_num {
                let extent = T::extent_closed(self.lo(i), self.hi(i))
                    .expect("integral coordinate must provide extent_closed");
                match acc.checked_mul(extent) {
                    Some(next) => acc = next,
                    None => {
                        saturated = true;
                        acc = i128::MAX;
                        break;
                    }
                }
            }
            Volume {
                value: acc as f64,
                saturated,
            }
        } else {
            let mut acc = 1.0f64;
            for i in 0..self.dim_num {
                let extent = T::extent_half_open(self.lo(i), self.hi(i))
                    .expect("float coordinate must provide extent_half_open");
                if extent <= 0.0 {
                    acc = 0.0;
                    break;
                }
                acc *= extent;
            }
            Volume {
                value: acc,
                saturated: false,
            }
        }
    }

    /// spec §4.2 `range_overlap_ratio(range, mbr)`:
    /// `volume(overlap_mbr(range, mbr)) / volume(mbr)`. `0.0` when
    /// disjoint, `1.0` when `range` contains `mbr` (or the accumulator
    /// saturated, per spec §4.1's overflow policy).
    pub fn overlap_ratio(&self, mbr: &MbrView<'_, T>) -> f64 {
        self.overlap_ratio_with_saturation(mbr).0
    }

    /// Like [`MbrView::overlap_ratio`], but also reports whether either
    /// volume computation saturated its `i128` accumulator, so a caller
    /// configured for strict overflow handling (spec §2.1 Configuration)
    /// can turn the clamp-to-`1.0` policy into a hard error instead of a
    /// logged warning.
    pub fn overlap_ratio_with_saturation(&self, mbr: &MbrView<'_, T>) -> (f64, bool) {
        let Some(overlap) = self.overlap(mbr) else {
            return (0.0, false);
        };
        let mbr_volume = mbr.volume();
        if mbr_volume.saturated {
            tracing::warn!(
                "MBR volume computation saturated its i128 accumulator; \
                 clamping overlap ratio to 1.0"
            );
            return (1.0, true);
        }
        if mbr_volume.value == 0.0 {
            return (0.0, false);
        }
        let overlap_volume = overlap.view().volume();
        if overlap_volume.saturated {
            return (1.0, true);
        }
        ((overlap_volume.value / mbr_volume.value).clamp(0.0, 1.0), false)
    }
}

impl<'a, T: Coordinate> PartialEq for MbrView<'a, T> {
    fn eq(&self, other: &Self) -> bool {
        self.dim_num == other.dim_num
            && (0..self.dim_num * 2)
                .all(|i| self.coords[i].bits_eq(&other.coords[i]))
    }
}

/// The result of a volume computation, carrying the overflow diagnostic
/// flag described in spec §4.1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Volume {
    pub value: f64,
    pub saturated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mbr2(a: (i32, i32), b: (i32, i32)) -> Mbr<i32> {
        Mbr::from_pairs(&[a, b])
    }

    #[test]
    fn intersects_and_contains() {
        let outer = mbr2((0, 10), (0, 10));
        let inner = mbr2((2, 4), (2, 4));
        assert!(outer.view().intersects(&inner.view()));
        assert!(outer.view().contains(&inner.view()));
        assert!(!inner.view().contains(&outer.view()));
    }

    #[test]
    fn union_is_tight() {
        let a = mbr2((0, 2), (0, 2));
        let b = mbr2((5, 8), (-1, 1));
        let u = Mbr::union(&a.view(), &b.view());
        assert_eq!((u.view().lo(0), u.view().hi(0)), (0, 8));
        assert_eq!((u.view().lo(1), u.view().hi(1)), (-1, 2));
    }

    #[test]
    fn integer_volume_is_inclusive() {
        let m = mbr2((0, 3), (0, 3));
        assert_eq!(m.view().volume().value, 16.0);
    }

    #[test]
    fn float_volume_is_half_open() {
        let m: Mbr<f64> = Mbr::from_pairs(&[(0.0, 4.0), (0.0, 4.0)]);
        assert_eq!(m.view().volume().value, 16.0);

        let degenerate: Mbr<f64> = Mbr::from_pairs(&[(1.0, 1.0), (0.0, 4.0)]);
        assert_eq!(degenerate.view().volume().value, 0.0);
    }

    #[test]
    fn overlap_ratio_bounds() {
        let mbr = mbr2((0, 9), (0, 9));
        let full = mbr2((0, 9), (0, 9));
        assert_eq!(full.view().overlap_ratio(&mbr.view()), 1.0);

        let disjoint = mbr2((20, 25), (20, 25));
        assert_eq!(disjoint.view().overlap_ratio(&mbr.view()), 0.0);

        let partial = mbr2((5, 14), (0, 9));
        let ratio = partial.view().overlap_ratio(&mbr.view());
        assert!(ratio > 0.0 && ratio < 1.0);
    }

    proptest! {
        #[test]
        fn union_always_contains_both_inputs(
            a0 in -1000i32..1000, a1 in -1000i32..1000,
            a2 in -1000i32..1000, a3 in -1000i32..1000,
            b0 in -1000i32..1000, b1 in -1000i32..1000,
            b2 in -1000i32..1000, b3 in -1000i32..1000,
        ) {
            let a = mbr2((a0.min(a1), a0.max(a1)), (a2.min(a3), a2.max(a3)));
            let b = mbr2((b0.min(b1), b0.max(b1)), (b2.min(b3), b2.max(b3)));
            let u = Mbr::union(&a.view(), &b.view());
            prop_assert!(u.view().contains(&a.view()));
            prop_assert!(u.view().contains(&b.view()));
        }

        #[test]
        fn integer_volume_is_never_negative(
            lo0 in -1000i32..1000, hi0 in -1000i32..1000,
            lo1 in -1000i32..1000, hi1 in -1000i32..1000,
        ) {
            let m = mbr2((lo0.min(hi0), lo0.max(hi0)), (lo1.min(hi1), lo1.max(hi1)));
            prop_assert!(m.view().volume().value >= 0.0);
        }

        #[test]
        fn overlap_ratio_is_always_in_unit_range(
            a0 in -50i32..50, a1 in -50i32..50,
            a2 in -50i32..50, a3 in -50i32..50,
            b0 in -50i32..50, b1 in -50i32..50,
            b2 in -50i32..50, b3 in -50i32..50,
        ) {
            let range = mbr2((a0.min(a1), a0.max(a1)), (a2.min(a3), a2.max(a3)));
            let tile = mbr2((b0.min(b1), b0.max(b1)), (b2.min(b3), b2.max(b3)));
            let ratio = range.view().overlap_ratio(&tile.view());
            prop_assert!((0.0..=1.0).contains(&ratio));
        }
    }
}
