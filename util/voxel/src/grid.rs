use crate::tissue::TissueLabel;
use glam::{DVec3, IVec3, UVec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
	#[error("volume dimensions must be non-zero, got {0}x{1}x{2}")]
	EmptyDimensions(u32, u32, u32),
	#[error("voxel spacing must be positive on every axis, got {0:?}")]
	NonPositiveSpacing(DVec3),
}

/// A labeled 3-D anatomical volume: one tissue label per voxel on a regular grid.
///
/// Voxel `(0, 0, 0)` spans `[origin, origin + spacing)`; the grid covers the
/// half-open box `[origin, origin + dim * spacing)`. Storage is a flat vector
/// with x fastest, then y, then z.
pub struct LabeledVolume {
	origin: DVec3,
	spacing: DVec3,
	dim: UVec3,
	data: Vec<TissueLabel>,
}

impl LabeledVolume {
	pub fn new(
		origin: DVec3,
		spacing: DVec3,
		dim: UVec3,
		fill: TissueLabel,
	) -> Result<Self, VolumeError> {
		if dim.x == 0 || dim.y == 0 || dim.z == 0 {
			return Err(VolumeError::EmptyDimensions(dim.x, dim.y, dim.z));
		}
		if spacing.x <= 0.0 || spacing.y <= 0.0 || spacing.z <= 0.0 {
			return Err(VolumeError::NonPositiveSpacing(spacing));
		}
		let len = dim.x as usize * dim.y as usize * dim.z as usize;
		Ok(Self { origin, spacing, dim, data: vec![fill; len] })
	}

	pub fn origin(&self) -> DVec3 {
		self.origin
	}

	pub fn spacing(&self) -> DVec3 {
		self.spacing
	}

	pub fn dimensions(&self) -> UVec3 {
		self.dim
	}

	/// Physical bounding box of the whole grid.
	pub fn fov(&self) -> (DVec3, DVec3) {
		(self.origin, self.origin + self.spacing * self.dim.as_dvec3())
	}

	fn index_of(&self, vox: IVec3) -> Option<usize> {
		if vox.x < 0 || vox.y < 0 || vox.z < 0 {
			return None;
		}
		let (x, y, z) = (vox.x as u32, vox.y as u32, vox.z as u32);
		if x >= self.dim.x || y >= self.dim.y || z >= self.dim.z {
			return None;
		}
		let (nx, ny) = (self.dim.x as usize, self.dim.y as usize);
		Some((z as usize * ny + y as usize) * nx + x as usize)
	}

	/// Maps a world-space point to its voxel index and fractional in-cell
	/// coordinates. The index may lie outside the grid; pair with
	/// [`Self::label_at`] which bounds-checks.
	pub fn world_to_voxel(&self, p: DVec3) -> (IVec3, DVec3) {
		let rel = (p - self.origin) / self.spacing;
		let cell = rel.floor();
		(cell.as_ivec3(), rel - cell)
	}

	/// World-space center of a voxel.
	pub fn voxel_center(&self, vox: IVec3) -> DVec3 {
		self.origin + (vox.as_dvec3() + 0.5) * self.spacing
	}

	/// Label at a voxel index, or `None` outside the grid.
	pub fn label_at(&self, vox: IVec3) -> Option<TissueLabel> {
		self.index_of(vox).map(|i| self.data[i])
	}

	/// Writes a label in place. Out-of-grid writes are dropped.
	pub fn set_label_at(&mut self, vox: IVec3, label: TissueLabel) {
		if let Some(i) = self.index_of(vox) {
			self.data[i] = label;
		}
	}

	/// Labels every voxel whose center satisfies the predicate. Intended for
	/// building phantoms out of simple regions (shells, slabs, spheres).
	pub fn fill_region(&mut self, mut pred: impl FnMut(DVec3) -> bool, label: TissueLabel) {
		for z in 0..self.dim.z as i32 {
			for y in 0..self.dim.y as i32 {
				for x in 0..self.dim.x as i32 {
					let vox = IVec3::new(x, y, z);
					if pred(self.voxel_center(vox)) {
						// index is in range by construction
						if let Some(i) = self.index_of(vox) {
							self.data[i] = label;
						}
					}
				}
			}
		}
	}

	/// Number of voxels currently carrying `label`.
	pub fn count_label(&self, label: TissueLabel) -> usize {
		self.data.iter().filter(|l| **l == label).count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn volume() -> LabeledVolume {
		LabeledVolume::new(
			DVec3::new(-1.0, -1.0, -1.0),
			DVec3::splat(0.5),
			UVec3::new(4, 4, 4),
			TissueLabel(1),
		)
		.unwrap()
	}

	#[test]
	fn test_rejects_degenerate_geometry() {
		assert!(LabeledVolume::new(
			DVec3::ZERO,
			DVec3::splat(0.5),
			UVec3::new(0, 4, 4),
			TissueLabel(0)
		)
		.is_err());
		assert!(LabeledVolume::new(
			DVec3::ZERO,
			DVec3::new(0.5, 0.0, 0.5),
			UVec3::new(4, 4, 4),
			TissueLabel(0)
		)
		.is_err());
	}

	#[test]
	fn test_world_to_voxel() {
		let vol = volume();
		let (vox, frac) = vol.world_to_voxel(DVec3::new(-1.0, -1.0, -1.0));
		assert_eq!(vox, IVec3::ZERO);
		assert_eq!(frac, DVec3::ZERO);

		let (vox, frac) = vol.world_to_voxel(DVec3::new(-0.75, 0.0, 0.9));
		assert_eq!(vox, IVec3::new(0, 2, 3));
		assert!((frac.x - 0.5).abs() < 1e-12);

		// below the origin lands on a negative index
		let (vox, _) = vol.world_to_voxel(DVec3::new(-1.2, 0.0, 0.0));
		assert_eq!(vox.x, -1);
	}

	#[test]
	fn test_label_roundtrip_and_bounds() {
		let mut vol = volume();
		let vox = IVec3::new(1, 2, 3);
		assert_eq!(vol.label_at(vox), Some(TissueLabel(1)));
		vol.set_label_at(vox, TissueLabel(9));
		assert_eq!(vol.label_at(vox), Some(TissueLabel(9)));

		assert_eq!(vol.label_at(IVec3::new(-1, 0, 0)), None);
		assert_eq!(vol.label_at(IVec3::new(0, 0, 4)), None);
		// out-of-grid writes are dropped, not panics
		vol.set_label_at(IVec3::new(4, 4, 4), TissueLabel(9));
		assert_eq!(vol.count_label(TissueLabel(9)), 1);
	}

	#[test]
	fn test_fov_and_voxel_center() {
		let vol = volume();
		let (lo, hi) = vol.fov();
		assert_eq!(lo, DVec3::splat(-1.0));
		assert_eq!(hi, DVec3::splat(1.0));
		assert_eq!(vol.voxel_center(IVec3::ZERO), DVec3::splat(-0.75));
	}

	#[test]
	fn test_fill_region() {
		let mut vol = volume();
		vol.fill_region(|p| p.x > 0.0, TissueLabel(5));
		// half the voxels sit at x > 0
		assert_eq!(vol.count_label(TissueLabel(5)), 32);
	}
}
