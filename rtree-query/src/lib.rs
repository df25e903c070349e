//! The Subarray abstraction and incomplete-result query planner (spec
//! §4.5-§4.6, §6): everything a caller drives once an [`rtree_index::RTree`]
//! already exists.

pub mod attribute;
pub mod config;
pub mod query;
pub mod store;
pub mod subarray;

pub use attribute::AttributeCellSize;
pub use config::PlannerConfig;
pub use query::{Query, QueryStatus};
pub use store::{Cell, InMemoryTileStore, TileStore};
pub use subarray::Subarray;
