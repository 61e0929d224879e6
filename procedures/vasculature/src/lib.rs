pub mod config;
pub mod density;
pub mod sampling;
pub mod tree;

pub use config::{BranchParams, ConfigError, SegmentParams, TreeParams, VesselConfig};
pub use density::DensityField;
pub use sampling::GrowthSampler;
pub use tree::branch::{Branch, BranchId, GrowthOutcome};
pub use tree::segment::Segment;
pub use tree::{TreeInit, VesselTree};
