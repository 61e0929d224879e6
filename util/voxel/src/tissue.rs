use serde::{Deserialize, Serialize};

/// Opaque voxel classification value.
///
/// The grower never interprets label values; it only compares them against
/// the entries of a [`TissueSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TissueLabel(pub u8);

/// The labels the vessel grower needs to recognize in a phantom volume.
///
/// Supplied by whoever built the volume; the values here are only a
/// conventional enumeration for tests and demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TissueSet {
	pub background: TissueLabel,
	pub skin: TissueLabel,
	pub muscle: TissueLabel,
	pub artery: TissueLabel,
}

impl Default for TissueSet {
	fn default() -> Self {
		Self {
			background: TissueLabel(0),
			skin: TissueLabel(2),
			muscle: TissueLabel(40),
			artery: TissueLabel(223),
		}
	}
}
