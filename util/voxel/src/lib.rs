pub mod grid;
pub mod tissue;

pub use grid::{LabeledVolume, VolumeError};
pub use tissue::{TissueLabel, TissueSet};
