/// The decomposition of a range query into fully and partially covered
/// leaf tiles (spec §3 `TileOverlap`).
///
/// Both lists are ordered ascending by leaf tile index; the two lists
/// interleave in that shared order as the traversal encounters them (spec
/// §4.4), so a consumer that wants one ascending stream merges them by
/// leaf index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileOverlap {
    pub full_tiles: Vec<usize>,
    pub partial_tiles: Vec<(usize, f64)>,
}

impl TileOverlap {
    pub fn is_empty(&self) -> bool {
        self.full_tiles.is_empty() && self.partial_tiles.is_empty()
    }

    /// Total number of leaf tiles touched by the query, full or partial.
    pub fn tile_count(&self) -> usize {
        self.full_tiles.len() + self.partial_tiles.len()
    }

    /// Merges `full_tiles` and `partial_tiles` into one ascending stream of
    /// `(leaf_idx, ratio)`, with full tiles reporting a ratio of `1.0`.
    /// Used by the planner (spec §4.6) and by tests asserting invariant 5
    /// from spec §8.
    pub fn merged_ascending(&self) -> Vec<(usize, f64)> {
        let mut full = self.full_tiles.iter().map(|&i| (i, 1.0));
        let mut partial = self.partial_tiles.iter().copied();

        let mut out = Vec::with_capacity(self.tile_count());
        let mut next_full = full.next();
        let mut next_partial = partial.next();
        loop {
            match (next_full, next_partial) {
                (Some(f), Some(p)) => {
                    if f.0 <= p.0 {
                        out.push(f);
                        next_full = full.next();
                    } else {
                        out.push(p);
                        next_partial = partial.next();
                    }
                }
                (Some(f), None) => {
                    out.push(f);
                    next_full = full.next();
                }
                (None, Some(p)) => {
                    out.push(p);
                    next_partial = partial.next();
                }
                (None, None) => break,
            }
        }
        out
    }
}
