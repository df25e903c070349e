//! Dynamically-typed entry points atop the statically-typed [`RTree<T>`]
//! core (spec §9 Design Notes).
//!
//! Storage-layer callers generally carry a run-time [`Datatype`] tag rather
//! than a compile-time `T: Coordinate` — they read a dimension's type out of
//! an array schema, then need an `RTree` over whichever Rust primitive that
//! tag names. [`build_dynamic`] is the one place that run-time tag is turned
//! into a compile-time type parameter, via [`physical_type_go!`]; everything
//! below that boundary is written once, generically.

use rtree_common::datatype::{Coordinate, Datatype};
use rtree_common::error::{Error, Result};
use rtree_common::physical_type_go;

use crate::mbr::Mbr;
use crate::rtree::RTree;

/// An [`RTree`] whose coordinate type was resolved at run time, one variant
/// per type in the glossary (spec §3).
pub enum AnyRTree {
    Int8(RTree<i8>),
    Int16(RTree<i16>),
    Int32(RTree<i32>),
    Int64(RTree<i64>),
    UInt8(RTree<u8>),
    UInt16(RTree<u16>),
    UInt32(RTree<u32>),
    UInt64(RTree<u64>),
    Float32(RTree<f32>),
    Float64(RTree<f64>),
}

impl AnyRTree {
    pub fn datatype(&self) -> Datatype {
        match self {
            AnyRTree::Int8(t) => t.datatype(),
            AnyRTree::Int16(t) => t.datatype(),
            AnyRTree::Int32(t) => t.datatype(),
            AnyRTree::Int64(t) => t.datatype(),
            AnyRTree::UInt8(t) => t.datatype(),
            AnyRTree::UInt16(t) => t.datatype(),
            AnyRTree::UInt32(t) => t.datatype(),
            AnyRTree::UInt64(t) => t.datatype(),
            AnyRTree::Float32(t) => t.datatype(),
            AnyRTree::Float64(t) => t.datatype(),
        }
    }

    pub fn dim_num(&self) -> usize {
        match self {
            AnyRTree::Int8(t) => t.dim_num(),
            AnyRTree::Int16(t) => t.dim_num(),
            AnyRTree::Int32(t) => t.dim_num(),
            AnyRTree::Int64(t) => t.dim_num(),
            AnyRTree::UInt8(t) => t.dim_num(),
            AnyRTree::UInt16(t) => t.dim_num(),
            AnyRTree::UInt32(t) => t.dim_num(),
            AnyRTree::UInt64(t) => t.dim_num(),
            AnyRTree::Float32(t) => t.dim_num(),
            AnyRTree::Float64(t) => t.dim_num(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            AnyRTree::Int8(t) => t.height(),
            AnyRTree::Int16(t) => t.height(),
            AnyRTree::Int32(t) => t.height(),
            AnyRTree::Int64(t) => t.height(),
            AnyRTree::UInt8(t) => t.height(),
            AnyRTree::UInt16(t) => t.height(),
            AnyRTree::UInt32(t) => t.height(),
            AnyRTree::UInt64(t) => t.height(),
            AnyRTree::Float32(t) => t.height(),
            AnyRTree::Float64(t) => t.height(),
        }
    }

    pub fn leaf_num(&self) -> usize {
        match self {
            AnyRTree::Int8(t) => t.leaf_num(),
            AnyRTree::Int16(t) => t.leaf_num(),
            AnyRTree::Int32(t) => t.leaf_num(),
            AnyRTree::Int64(t) => t.leaf_num(),
            AnyRTree::UInt8(t) => t.leaf_num(),
            AnyRTree::UInt16(t) => t.leaf_num(),
            AnyRTree::UInt32(t) => t.leaf_num(),
            AnyRTree::UInt64(t) => t.leaf_num(),
            AnyRTree::Float32(t) => t.leaf_num(),
            AnyRTree::Float64(t) => t.leaf_num(),
        }
    }
}

/// Binds a concrete `Coordinate` type to its [`AnyRTree`] constructor, so
/// the body of [`build_dynamic`]'s `physical_type_go!` arm can wrap a freshly
/// built `RTree<DT>` without re-matching on `datatype`.
trait IntoAnyRTree: Coordinate {
    fn wrap(tree: RTree<Self>) -> AnyRTree;
}

macro_rules! impl_into_any_rtree {
    ($($T:ty => $variant:ident),+ $(,)?) => {
        $(
            impl IntoAnyRTree for $T {
                fn wrap(tree: RTree<Self>) -> AnyRTree {
                    AnyRTree::$variant(tree)
                }
            }
        )+
    };
}

impl_into_any_rtree!(
    i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
    u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64,
    f32 => Float32, f64 => Float64,
);

/// Builds an [`AnyRTree`] from raw little-endian leaf MBR coordinates,
/// dispatching on `datatype` exactly once (spec §9 "tagged dispatch");
/// `leaf_bytes` holds `mbr_num` MBRs laid out the same way
/// [`crate::serialize::serialize`] writes one level: flat
/// `lo_0,hi_0,..,lo_{D-1},hi_{D-1}` coordinates, back to back.
pub fn build_dynamic(
    dim_num: usize,
    fanout: usize,
    datatype: Datatype,
    leaf_bytes: &[u8],
) -> Result<AnyRTree> {
    physical_type_go!(datatype, DT, {
        let mbrs = decode_leaves::<DT>(dim_num, leaf_bytes)?;
        let tree = RTree::<DT>::build(dim_num, fanout, mbrs)?;
        Ok(<DT as IntoAnyRTree>::wrap(tree))
    })
}

fn decode_leaves<T: Coordinate>(dim_num: usize, bytes: &[u8]) -> Result<Vec<Mbr<T>>> {
    let width = T::BYTE_WIDTH;
    let per_mbr_coords = dim_num * 2;
    let per_mbr_bytes = per_mbr_coords * width;
    if per_mbr_bytes == 0 {
        return Err(Error::invalid_argument("dim_num must be nonzero"));
    }
    if bytes.len() % per_mbr_bytes != 0 {
        return Err(Error::invalid_argument(
            "leaf byte length does not divide evenly into mbrs of this dim_num/datatype",
        ));
    }
    let mbr_num = bytes.len() / per_mbr_bytes;
    let mut mbrs = Vec::with_capacity(mbr_num);
    for i in 0..mbr_num {
        let mut pairs = Vec::with_capacity(dim_num);
        for d in 0..dim_num {
            let base = i * per_mbr_bytes + d * 2 * width;
            let lo = T::read_le_bytes(&bytes[base..base + width]);
            let hi = T::read_le_bytes(&bytes[base + width..base + 2 * width]);
            pairs.push((lo, hi));
        }
        mbrs.push(Mbr::from_pairs(&pairs));
    }
    Ok(mbrs)
}
