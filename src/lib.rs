pub mod classify;
pub mod config;
pub mod drainage;
pub mod error;
pub mod kernel;
pub mod pipeline;
pub mod render;
pub mod segment;
pub mod simplify;
pub mod stitch;
pub mod store;
pub mod thin;

pub use config::{ConsolidationParams, IslandSelector, NamedSeed, StyleMarkers};
pub use drainage::{DrainageNode, DrainageOutcome, DrainageTree, LevelYield, assemble};
pub use error::{Error, Result};
pub use kernel::GeometryError;
pub use pipeline::{Report, consolidate_and_assemble, run_pipeline};
pub use render::save_preview_png;
pub use segment::{Classification, Orientation, Segment, SegmentId};
pub use store::{FeatureStore, SegmentUpdate, StoreError};
