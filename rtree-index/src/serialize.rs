//! Length-prefixed per-level (de)serialization of an [`RTree`] (spec §6).
//!
//! The persisted format is opaque to everything outside this crate; the
//! storage layer that actually writes fragment metadata to disk owns the
//! surrounding container format. What we guarantee here is the round-trip
//! law from spec §8: `deserialize(serialize(tree)) == tree`.

use rtree_common::datatype::Coordinate;
use rtree_common::error::{Error, Result};

use crate::level::Level;
use crate::rtree::RTree;

/// `u64 level_count, for each level: u64 mbr_count, raw bytes[mbr_count *
/// 2 * D * sizeof(T)]` (spec §6), little-endian throughout.
pub fn serialize<T: Coordinate>(tree: &RTree<T>) -> Vec<u8> {
    let levels = tree.levels();
    let mut out = Vec::new();
    out.extend_from_slice(&(levels.len() as u64).to_le_bytes());
    for level in levels {
        out.extend_from_slice(&(level.mbr_num() as u64).to_le_bytes());
        for &coord in level.as_flat_coords() {
            coord.write_le_bytes(&mut out);
        }
    }
    out
}

/// Reconstructs a tree from `bytes` produced by [`serialize`]. `dim_num`
/// and `fanout` are supplied by the caller, the same way `D` and `F` are
/// supplied to [`RTree::build`] — they are not themselves encoded in the
/// byte stream (spec §6).
pub fn deserialize<T: Coordinate>(
    bytes: &[u8],
    dim_num: usize,
    fanout: usize,
) -> Result<RTree<T>> {
    if dim_num == 0 {
        return Err(Error::invalid_argument("dim_num must be nonzero"));
    }

    let mut cursor = 0usize;
    let level_count = read_u64(bytes, &mut cursor)? as usize;
    if level_count == 0 {
        return Err(Error::invalid_argument(
            "serialized r-tree has zero levels",
        ));
    }

    let mut levels = Vec::with_capacity(level_count);
    for _ in 0..level_count {
        let mbr_num = read_u64(bytes, &mut cursor)? as usize;
        let coord_count = mbr_num * 2 * dim_num;
        let byte_len = coord_count * T::BYTE_WIDTH;
        let slice = bytes.get(cursor..cursor + byte_len).ok_or_else(|| {
            Error::invalid_argument(
                "serialized r-tree is truncated mid-level",
            )
        })?;
        cursor += byte_len;

        let mut coords = Vec::with_capacity(coord_count);
        for chunk in slice.chunks_exact(T::BYTE_WIDTH) {
            coords.push(T::read_le_bytes(chunk));
        }

        let level = Level::from_flat(dim_num, mbr_num, coords)
            .ok_or_else(|| Error::internal("level coordinate count mismatch"))?;
        levels.push(level);
    }

    RTree::from_levels(dim_num, fanout, levels)
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    let slice = bytes.get(*cursor..*cursor + 8).ok_or_else(|| {
        Error::invalid_argument("serialized r-tree is truncated in its header")
    })?;
    *cursor += 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbr::Mbr;

    fn leaf(lo0: i32, hi0: i32, lo1: i32, hi1: i32) -> Mbr<i32> {
        Mbr::from_pairs(&[(lo0, hi0), (lo1, hi1)])
    }

    #[test]
    fn round_trips_a_multi_level_tree() {
        let leaves: Vec<_> = (0..23).map(|i| leaf(i, i, -i, -i)).collect();
        let tree = RTree::build(2, 3, leaves).unwrap();

        let bytes = serialize(&tree);
        let restored: RTree<i32> =
            deserialize(&bytes, tree.dim_num(), tree.fanout()).unwrap();

        assert_eq!(restored.height(), tree.height());
        assert_eq!(restored.leaf_num(), tree.leaf_num());
        for i in 0..tree.leaf_num() {
            assert_eq!(
                restored.leaf_mbr(i).to_owned_mbr(),
                tree.leaf_mbr(i).to_owned_mbr()
            );
        }
        assert_eq!(
            restored.root_mbr().to_owned_mbr(),
            tree.root_mbr().to_owned_mbr()
        );
    }

    #[test]
    fn build_then_extract_leaves_preserves_input_order() {
        let leaves: Vec<_> = (0..10).map(|i| leaf(i, i, 0, 0)).collect();
        let tree = RTree::build(2, 4, leaves.clone()).unwrap();
        for (i, original) in leaves.iter().enumerate() {
            assert_eq!(tree.leaf_mbr(i).to_owned_mbr(), *original);
        }
    }

    #[test]
    fn rejects_truncated_bytes() {
        let tree = RTree::build(2, 4, vec![leaf(0, 3, 0, 3)]).unwrap();
        let mut bytes = serialize(&tree);
        bytes.truncate(bytes.len() - 1);
        let result: Result<RTree<i32>> = deserialize(&bytes, 2, 4);
        assert!(result.is_err());
    }
}
