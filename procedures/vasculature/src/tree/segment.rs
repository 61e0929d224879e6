use crate::config::SegmentParams;
use crate::density::DensityField;
use crate::sampling::GrowthSampler;
use glam::{DVec3, IVec3};
use rayon::prelude::*;
use std::f64::consts::PI;
use voxel::{LabeledVolume, TissueSet};

/// The moving end of a growing branch: where the next segment starts.
#[derive(Debug, Clone, Copy)]
pub struct GrowthFront {
	pub position: DVec3,
	/// Unit growth direction.
	pub direction: DVec3,
	pub radius: f64,
	/// Radius derivative carried across the node boundary.
	pub derivative: f64,
}

/// One committed growth unit: a circular arc of fixed length whose radius
/// follows a cubic profile from start to end.
#[derive(Debug, Clone)]
pub struct Segment {
	pub start_position: DVec3,
	pub start_direction: DVec3,
	pub start_radius: f64,
	pub start_derivative: f64,
	pub end_position: DVec3,
	pub end_direction: DVec3,
	pub end_radius: f64,
	pub end_derivative: f64,
	/// Arc length; exactly 0.0 marks a generation failure.
	pub length: f64,
	pub curvature_center: DVec3,
	pub curvature_radius: f64,
	shape: [f64; 4],
}

impl Segment {
	/// Vessel radius at arc-length position `t`, from the cubic profile.
	/// Zero outside `[0, length]`.
	pub fn radius_at(&self, t: f64) -> f64 {
		if t >= 0.0 && t <= self.length {
			self.shape[0] * t * t * t + self.shape[1] * t * t + self.shape[2] * t + self.shape[3]
		} else {
			0.0
		}
	}

	/// A zero-length segment is the canonical generation-failure signal: the
	/// candidate search exhausted every retry without an admissible arc.
	pub fn is_failure(&self) -> bool {
		self.length == 0.0
	}

	pub(crate) fn end_front(&self) -> GrowthFront {
		GrowthFront {
			position: self.end_position,
			direction: self.end_direction,
			radius: self.end_radius,
			derivative: self.end_derivative,
		}
	}

	fn failure(front: &GrowthFront) -> Self {
		Self {
			start_position: front.position,
			start_direction: front.direction,
			start_radius: front.radius,
			start_derivative: front.derivative,
			end_position: front.position,
			end_direction: front.direction,
			end_radius: front.radius,
			end_derivative: front.derivative,
			length: 0.0,
			curvature_center: front.position,
			curvature_radius: 0.0,
			shape: [0.0, 0.0, front.derivative, front.radius],
		}
	}
}

/// Orthonormal basis of the plane through `position` normal to `direction`,
/// built by projecting the origin onto that plane. Falls back to an arbitrary
/// in-plane vector when the projection degenerates (position on the axis).
pub(crate) fn perpendicular_basis(direction: DVec3, position: DVec3) -> (DVec3, DVec3) {
	let projected = direction * direction.dot(position) - position;
	let basis1 = match projected.try_normalize() {
		Some(v) => v,
		None => direction.any_orthonormal_vector(),
	};
	(basis1, direction.cross(basis1))
}

/// A sampled arc: its center of rotation and radius of curvature. The arc
/// leaves the growth front tangent to the front's direction.
struct Candidate {
	center: DVec3,
	radius: f64,
}

impl Candidate {
	fn point_at(&self, front: &GrowthFront, s: f64) -> DVec3 {
		let radial = (front.position - self.center).normalize();
		let angle = s / self.radius;
		self.center + self.radius * (radial * angle.cos() + front.direction * angle.sin())
	}

	fn direction_at(&self, front: &GrowthFront, s: f64) -> DVec3 {
		let radial = (front.position - self.center).normalize();
		let angle = s / self.radius;
		(-radial * angle.sin() + front.direction * angle.cos()).normalize()
	}
}

/// Drives the candidate search for one segment: sample, validate along the
/// arc, score against the density field, keep the best, shrink and retry on a
/// dry pass, and finally commit into the volume and density field.
pub(crate) struct SegmentGrower<'a> {
	pub params: &'a SegmentParams,
	pub sampler: &'a mut GrowthSampler,
	pub density: &'a mut DensityField,
	pub volume: &'a mut LabeledVolume,
	pub tissue: &'a TissueSet,
	pub preferred_direction: DVec3,
}

impl SegmentGrower<'_> {
	pub fn grow(&mut self, front: GrowthFront, remaining: f64) -> Segment {
		let mut length = self.propose_length(remaining);
		let mut best: Option<(f64, Candidate)> = None;
		let mut draws = 0u32;

		while best.is_none() && draws < self.params.abs_max_try {
			for _ in 0..self.params.num_try {
				// up to max_try raw draws to find one admissible arc
				let mut admitted = None;
				let mut raw = 0u32;
				while admitted.is_none() && raw < self.params.max_try {
					raw += 1;
					draws += 1;
					let candidate = self.draw_candidate(&front, length);
					if self.arc_is_clear(&front, &candidate, length) {
						admitted = Some(candidate);
					}
				}
				if let Some(candidate) = admitted {
					let cost = self.cost(&front, &candidate, length);
					let replace = match &best {
						None => true,
						Some((best_cost, _)) => cost < *best_cost,
					};
					if replace {
						best = Some((cost, candidate));
					}
				}
			}
			if best.is_none() {
				log::debug!("no admissible arc at length {:.3}, shrinking", length);
				length /= 10.0;
			}
		}

		match best {
			None => Segment::failure(&front),
			Some((_, candidate)) => self.commit(&front, &candidate, length),
		}
	}

	/// Proposed arc length for this segment, from the branch's remaining
	/// length budget and the configured bracket.
	fn propose_length(&mut self, remaining: f64) -> f64 {
		let params = self.params;
		if params.max_length < remaining / 10.0 {
			params.max_length
		} else if params.min_length > remaining {
			params.min_length
		} else {
			let lb = params.min_length.max(remaining / 10.0);
			let ub = params.max_length.min(remaining);
			let u = self.sampler.uniform();
			lb + self.sampler.length_quantile(u) * (ub - lb)
		}
	}

	fn draw_candidate(&mut self, front: &GrowthFront, length: f64) -> Candidate {
		let params = self.params;
		let theta = 2.0 * PI * self.sampler.uniform();
		// the turn-angle cap sets the curvature-radius floor
		let radius_lb = length / (PI * params.max_curvature_frac);
		let radius_ub = params.max_curvature_radius;
		let u = self.sampler.uniform();
		let radius = radius_lb + self.sampler.radius_quantile(u) * (radius_ub - radius_lb);

		let (basis1, basis2) = perpendicular_basis(front.direction, front.position);
		let center = front.position + radius * (theta.cos() * basis1 + theta.sin() * basis2);
		Candidate { center, radius }
	}

	/// Walks the arc at chord step `roi_step` plus the exact endpoint; every
	/// sample must sit inside the volume and outside forbidden tissue.
	fn arc_is_clear(&self, front: &GrowthFront, candidate: &Candidate, length: f64) -> bool {
		let step = self.params.roi_step;
		let mut s = 0.0;
		while s < length {
			if !self.point_admissible(candidate.point_at(front, s)) {
				return false;
			}
			s += step;
		}
		self.point_admissible(candidate.point_at(front, length))
	}

	fn point_admissible(&self, point: DVec3) -> bool {
		let (lo, hi) = self.volume.fov();
		if point.x < lo.x
			|| point.x > hi.x
			|| point.y < lo.y
			|| point.y > hi.y
			|| point.z < lo.z
			|| point.z > hi.z
		{
			return false;
		}
		let (vox, _) = self.volume.world_to_voxel(point);
		match self.volume.label_at(vox) {
			Some(label) => label != self.tissue.skin && label != self.tissue.background,
			None => false,
		}
	}

	/// Candidate cost: density shrinkage at the arc endpoint, minus alignment
	/// with the preferential growth direction. Lower is better.
	fn cost(&self, front: &GrowthFront, candidate: &Candidate, length: f64) -> f64 {
		let end_position = candidate.point_at(front, length);
		let end_direction = candidate.direction_at(front, length);
		self.params.density_weight * self.density.shrinkage(end_position)
			- self.params.angle_weight * end_direction.dot(self.preferred_direction)
	}

	fn commit(&mut self, front: &GrowthFront, candidate: &Candidate, length: f64) -> Segment {
		let params = self.params;
		let curvature_radius = (candidate.center - front.position).length();
		let end_position = candidate.point_at(front, length);
		let end_direction = candidate.direction_at(front, length);
		// derivatives stay pinned to zero where segments meet
		let end_derivative = 0.0;
		let u = self.sampler.uniform();
		let end_radius = (params.min_end_radius_frac
			+ u * (params.max_end_radius_frac - params.min_end_radius_frac))
			* front.radius;
		let shape =
			fit_radius_profile(front.radius, front.derivative, end_radius, end_derivative, length);

		let segment = Segment {
			start_position: front.position,
			start_direction: front.direction,
			start_radius: front.radius,
			start_derivative: front.derivative,
			end_position,
			end_direction,
			end_radius,
			end_derivative,
			length,
			curvature_center: candidate.center,
			curvature_radius,
			shape,
		};
		self.rasterize(&segment);
		self.density.tighten(segment.end_position);
		segment
	}

	/// Writes the committed arc into the volume: axial steps of half the
	/// minimum voxel spacing, and at each step every voxel within the local
	/// radius in the plane normal to the local tangent. Voxel positions are
	/// computed in parallel; the label writes land afterward.
	fn rasterize(&mut self, segment: &Segment) {
		let basis1 = segment.start_direction;
		let basis2 = (segment.curvature_center - segment.start_position) / segment.curvature_radius;
		let basis3 = basis1.cross(basis2);

		let spacing = self.volume.spacing();
		let step = spacing.x.min(spacing.y).min(spacing.z) / 2.0;
		let axial_steps = (segment.length / step).ceil() as usize;

		let volume = &*self.volume;
		let touched: Vec<IVec3> = (0..=axial_steps)
			.into_par_iter()
			.flat_map_iter(|axial_index| {
				let mut voxels = Vec::new();
				let lpos = axial_index as f64 * step;
				let local_radius = segment.radius_at(lpos);
				let r = segment.curvature_radius;
				let angle = lpos / r;
				let axial =
					segment.curvature_center + r * (-angle.cos() * basis2 + angle.sin() * basis1);
				let radial = (segment.curvature_center - axial) / r;

				let mut rpos = 0.0;
				while rpos < local_radius {
					if rpos < step {
						// on axis a single sample covers the voxel
						let point = axial - rpos * radial;
						voxels.push(volume.world_to_voxel(point).0);
					} else {
						let angle_step = step / rpos;
						let mut apos = 0.0;
						while apos < 2.0 * PI {
							let point = axial + rpos * (-apos.cos() * radial + apos.sin() * basis3);
							voxels.push(volume.world_to_voxel(point).0);
							apos += angle_step;
						}
					}
					rpos += step;
				}
				voxels.into_iter()
			})
			.collect();

		let artery = self.tissue.artery;
		for vox in touched {
			self.volume.set_label_at(vox, artery);
		}
	}
}

/// Cubic radius profile `c0 t^3 + c1 t^2 + c2 t + c3` over `[0, length]`, fit
/// to the boundary radii and radius derivatives at both ends.
fn fit_radius_profile(
	start_radius: f64,
	start_derivative: f64,
	end_radius: f64,
	end_derivative: f64,
	length: f64,
) -> [f64; 4] {
	let c3 = start_radius;
	let c2 = start_derivative;
	let residual = end_radius - c2 * length - c3;
	let c0 = (end_derivative - c2 - 2.0 * residual / length) / (length * length);
	let c1 = residual / (length * length) - c0 * length;
	[c0, c1, c2, c3]
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::SegmentParams;
	use crate::density::DensityField;
	use crate::sampling::GrowthSampler;
	use glam::{DVec3, UVec3};
	use voxel::{LabeledVolume, TissueLabel, TissueSet};

	const FAT: TissueLabel = TissueLabel(1);

	fn params() -> SegmentParams {
		SegmentParams {
			min_length: 0.5,
			max_length: 2.0,
			num_try: 3,
			max_try: 20,
			abs_max_try: 500,
			max_curvature_radius: 50.0,
			max_curvature_frac: 0.25,
			roi_step: 0.25,
			..SegmentParams::default()
		}
	}

	fn open_volume() -> LabeledVolume {
		// 30mm cube of unobstructed interior tissue
		LabeledVolume::new(DVec3::ZERO, DVec3::splat(0.5), UVec3::splat(60), FAT).unwrap()
	}

	fn front() -> GrowthFront {
		GrowthFront {
			position: DVec3::splat(15.0),
			direction: DVec3::X,
			radius: 1.0,
			derivative: 0.0,
		}
	}

	fn grow_one(
		params: &SegmentParams,
		volume: &mut LabeledVolume,
		seed: u64,
		remaining: f64,
	) -> Segment {
		let mut sampler = GrowthSampler::new(seed, params).unwrap();
		let (lo, hi) = volume.fov();
		let mut density = DensityField::new(lo, hi, [8, 8, 8]);
		let tissue = TissueSet::default();
		SegmentGrower {
			params,
			sampler: &mut sampler,
			density: &mut density,
			volume,
			tissue: &tissue,
			preferred_direction: DVec3::X,
		}
		.grow(front(), remaining)
	}

	#[test]
	fn test_radius_profile_hits_boundary_conditions() {
		let length = 3.0;
		let shape = fit_radius_profile(1.2, 0.0, 0.8, 0.0, length);
		let at = |t: f64| shape[0] * t * t * t + shape[1] * t * t + shape[2] * t + shape[3];
		assert_eq!(at(0.0), 1.2);
		assert!((at(length) - 0.8).abs() < 1e-9);
		// derivative at both ends
		let deriv = |t: f64| 3.0 * shape[0] * t * t + 2.0 * shape[1] * t + shape[2];
		assert_eq!(deriv(0.0), 0.0);
		assert!(deriv(length).abs() < 1e-9);
	}

	#[test]
	fn test_grown_segment_geometry() {
		let params = params();
		let mut volume = open_volume();
		let segment = grow_one(&params, &mut volume, 11, 8.0);

		assert!(!segment.is_failure());
		assert!(segment.length > 0.0);
		assert_eq!(segment.radius_at(0.0), segment.start_radius);
		assert!((segment.radius_at(segment.length) - segment.end_radius).abs() < 1e-9);
		assert_eq!(segment.radius_at(segment.length + 1.0), 0.0);
		// unit end direction, endpoint on the arc
		assert!((segment.end_direction.length() - 1.0).abs() < 1e-12);
		let radial = (segment.end_position - segment.curvature_center).length();
		assert!((radial - segment.curvature_radius).abs() < 1e-6);
		// end radius respects the configured fraction bracket
		let frac = segment.end_radius / segment.start_radius;
		assert!(frac >= params.min_end_radius_frac && frac <= params.max_end_radius_frac);
		// the committed arc was written into the volume
		assert!(volume.count_label(TissueSet::default().artery) > 0);
	}

	#[test]
	fn test_turn_angle_capped() {
		let params = params();
		let mut volume = open_volume();
		let segment = grow_one(&params, &mut volume, 3, 8.0);
		// arc angle = length / curvature radius, bounded by pi * max_curvature_frac
		let turn = segment.length / segment.curvature_radius;
		assert!(turn <= PI * params.max_curvature_frac + 1e-12);
		// the end direction still deviates by exactly the turn angle
		let dot = segment.end_direction.dot(segment.start_direction).clamp(-1.0, 1.0);
		assert!((dot.acos() - turn).abs() < 1e-6);
	}

	#[test]
	fn test_failure_identity_in_closed_volume() {
		let params = params();
		// entirely background: no arc can ever be admissible
		let mut volume = LabeledVolume::new(
			DVec3::ZERO,
			DVec3::splat(0.5),
			UVec3::splat(60),
			TissueSet::default().background,
		)
		.unwrap();
		let start = front();
		let segment = grow_one(&params, &mut volume, 5, 8.0);

		assert!(segment.is_failure());
		assert_eq!(segment.length, 0.0);
		assert_eq!(segment.end_position, start.position);
		assert_eq!(segment.end_direction, start.direction);
		assert_eq!(segment.end_radius, start.radius);
		assert_eq!(segment.radius_at(0.0), start.radius);
		assert_eq!(volume.count_label(TissueSet::default().artery), 0);
	}

	#[test]
	fn test_arc_never_crosses_skin() {
		let params = SegmentParams {
			min_length: 6.0,
			max_length: 6.0,
			// near-straight arcs only: every full-length arc must hit the wall
			max_curvature_frac: 0.05,
			max_curvature_radius: 200.0,
			..params()
		};
		let mut volume = open_volume();
		let skin = TissueSet::default().skin;
		// skin wall across the growth direction
		volume.fill_region(|p| p.x >= 20.0 && p.x < 21.0, skin);

		let segment = grow_one(&params, &mut volume, 17, 6.0);

		if !segment.is_failure() {
			// only an arc shrunk far short of the wall can have been admitted
			assert!(segment.end_position.x < 17.0);
		}
		// nothing was ever rasterized into or past the wall
		for ix in 0..volume.dimensions().x as i32 {
			for iy in 0..volume.dimensions().y as i32 {
				for iz in 0..volume.dimensions().z as i32 {
					let vox = glam::IVec3::new(ix, iy, iz);
					if volume.voxel_center(vox).x >= 20.0 {
						assert_ne!(volume.label_at(vox), Some(TissueSet::default().artery));
					}
				}
			}
		}
	}

	#[test]
	fn test_short_remaining_budget_uses_min_length() {
		let params = params();
		let mut volume = open_volume();
		// remaining budget below min_length forces the minimum
		let segment = grow_one(&params, &mut volume, 23, 0.1);
		assert!(!segment.is_failure());
		assert!((segment.length - params.min_length).abs() < 1e-12);
	}
}
