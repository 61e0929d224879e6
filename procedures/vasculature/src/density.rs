use glam::DVec3;
use rayon::prelude::*;

/// Marker for cells the field does not track.
const INACTIVE: f64 = -1.0;

/// Cells are visited in fixed-size chunks so the parallel reduction happens in
/// a deterministic order; an unordered reduce would let thread scheduling
/// change the f64 sum and, with it, candidate selection.
const CHUNK: usize = 4096;

/// Auxiliary fill grid tracking, per active cell, the squared distance to the
/// nearest committed vessel point. Read when scoring candidate arcs, tightened
/// after every commit; values never increase over the field's lifetime.
///
/// Geometry follows the covered box: `spacing = (hi - lo) / n`, with the first
/// cell center at `lo + spacing / 2`. Storage is x-fastest, then y, then z.
pub struct DensityField {
	origin: DVec3,
	spacing: DVec3,
	dim: [usize; 3],
	cells: Vec<f64>,
}

impl DensityField {
	/// A fresh field over `[lo, hi]` is fully active at the box's squared
	/// diagonal: no vessel point has been committed yet.
	pub fn new(lo: DVec3, hi: DVec3, n_fill: [usize; 3]) -> Self {
		let n = DVec3::new(n_fill[0] as f64, n_fill[1] as f64, n_fill[2] as f64);
		let spacing = (hi - lo) / n;
		let origin = lo + spacing / 2.0;
		let initial = (hi - lo).length_squared();
		Self { origin, spacing, dim: n_fill, cells: vec![initial; n_fill[0] * n_fill[1] * n_fill[2]] }
	}

	pub fn dimensions(&self) -> [usize; 3] {
		self.dim
	}

	pub fn len(&self) -> usize {
		self.cells.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cells.is_empty()
	}

	pub fn values(&self) -> &[f64] {
		&self.cells
	}

	pub fn value_at(&self, cell: usize) -> f64 {
		self.cells[cell]
	}

	pub fn is_active(&self, cell: usize) -> bool {
		self.cells[cell] > 0.0
	}

	/// World-space center of a cell by linear index.
	pub fn cell_center(&self, cell: usize) -> DVec3 {
		let (nx, ny) = (self.dim[0], self.dim[1]);
		let x = cell % nx;
		let y = (cell / nx) % ny;
		let z = cell / (nx * ny);
		self.origin + self.spacing * DVec3::new(x as f64, y as f64, z as f64)
	}

	/// Stops tracking every cell whose center satisfies the predicate.
	pub fn deactivate_where(&mut self, mut pred: impl FnMut(DVec3) -> bool) {
		for cell in 0..self.cells.len() {
			if pred(self.cell_center(cell)) {
				self.cells[cell] = INACTIVE;
			}
		}
	}

	/// Candidate score term: the total reduction in stored squared distances
	/// if a vessel point were committed at `point`. Non-positive; more
	/// negative means the point opens up territory the tree has not reached.
	pub fn shrinkage(&self, point: DVec3) -> f64 {
		let center = self.center_fn();
		let partials: Vec<f64> = self
			.cells
			.par_chunks(CHUNK)
			.enumerate()
			.map(|(chunk_index, chunk)| {
				let base = chunk_index * CHUNK;
				let mut sum = 0.0;
				for (offset, &value) in chunk.iter().enumerate() {
					if value > 0.0 {
						let d2 = center(base + offset).distance_squared(point);
						if d2 < value {
							sum += d2 - value;
						}
					}
				}
				sum
			})
			.collect();
		partials.iter().sum()
	}

	/// Post-commit pass: every active cell keeps the smaller of its stored
	/// value and the squared distance to `point`. Min-writes commute, so the
	/// cells can be updated in any order.
	pub fn tighten(&mut self, point: DVec3) {
		let center = self.center_fn();
		self.cells.par_chunks_mut(CHUNK).enumerate().for_each(|(chunk_index, chunk)| {
			let base = chunk_index * CHUNK;
			for (offset, value) in chunk.iter_mut().enumerate() {
				if *value > 0.0 {
					let d2 = center(base + offset).distance_squared(point);
					if d2 < *value {
						*value = d2;
					}
				}
			}
		});
	}

	/// Index-to-center map that captures the geometry by value, usable while
	/// `cells` is mutably borrowed.
	fn center_fn(&self) -> impl Fn(usize) -> DVec3 + Sync {
		let (origin, spacing) = (self.origin, self.spacing);
		let (nx, ny) = (self.dim[0], self.dim[1]);
		move |cell| {
			let x = cell % nx;
			let y = (cell / nx) % ny;
			let z = cell / (nx * ny);
			origin + spacing * DVec3::new(x as f64, y as f64, z as f64)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn field() -> DensityField {
		DensityField::new(DVec3::ZERO, DVec3::splat(1.0), [4, 4, 4])
	}

	#[test]
	fn test_geometry() {
		let f = field();
		assert_eq!(f.len(), 64);
		assert_eq!(f.cell_center(0), DVec3::splat(0.125));
		assert_eq!(f.cell_center(1), DVec3::new(0.375, 0.125, 0.125));
		assert_eq!(f.cell_center(4), DVec3::new(0.125, 0.375, 0.125));
		assert_eq!(f.cell_center(16), DVec3::new(0.125, 0.125, 0.375));
		// fresh fields start at the squared diagonal
		assert_eq!(f.value_at(0), 3.0);
	}

	#[test]
	fn test_tighten_is_monotone_and_idempotent() {
		let mut f = field();
		let p = DVec3::new(0.5, 0.5, 0.5);
		let before: Vec<f64> = f.values().to_vec();
		f.tighten(p);
		let after: Vec<f64> = f.values().to_vec();
		for (b, a) in before.iter().zip(after.iter()) {
			assert!(a <= b);
		}
		f.tighten(p);
		assert_eq!(f.values(), after.as_slice());

		// a later point can only tighten further
		f.tighten(DVec3::new(0.1, 0.1, 0.1));
		for (a, v) in after.iter().zip(f.values()) {
			assert!(v <= a);
		}
	}

	#[test]
	fn test_shrinkage_matches_tighten() {
		let mut f = field();
		let p = DVec3::new(0.25, 0.75, 0.25);
		let predicted = f.shrinkage(p);
		assert!(predicted < 0.0);

		let before: f64 = f.values().iter().sum();
		f.tighten(p);
		let actual: f64 = f.values().iter().sum::<f64>() - before;
		assert!((predicted - actual).abs() < 1e-9);

		// once tightened at p, committing at p again changes nothing
		assert_eq!(f.shrinkage(p), 0.0);
	}

	#[test]
	fn test_inactive_cells_are_ignored() {
		let mut f = field();
		f.deactivate_where(|c| c.z < 0.5);
		let p = DVec3::splat(0.1);
		f.tighten(p);
		for cell in 0..f.len() {
			if f.cell_center(cell).z < 0.5 {
				assert!(!f.is_active(cell));
				assert!(f.value_at(cell) < 0.0);
			}
		}
		// a fully deactivated field scores nothing
		let mut dead = field();
		dead.deactivate_where(|_| true);
		assert_eq!(dead.shrinkage(p), 0.0);
	}
}
