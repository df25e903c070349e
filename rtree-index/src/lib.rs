//! The R-tree tile index (spec §4.2-§4.4): bottom-up bulk build, fanout,
//! height, MBR storage, range/point overlap queries, and tile overlap
//! ratios. Immutable once built.

pub mod dynamic;
pub mod level;
pub mod mbr;
pub mod rtree;
pub mod serialize;
pub mod tile_overlap;

pub use dynamic::{build_dynamic, AnyRTree};
pub use level::Level;
pub use mbr::{Mbr, MbrView, Volume};
pub use rtree::RTree;
pub use tile_overlap::TileOverlap;
