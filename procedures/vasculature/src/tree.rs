pub mod branch;
pub mod segment;

use crate::config::{ConfigError, VesselConfig};
use crate::density::DensityField;
use crate::sampling::GrowthSampler;
use branch::{Branch, BranchId, GrowthOutcome};
use glam::{DVec3, IVec3};
use segment::{GrowthFront, SegmentGrower};
use std::f64::consts::PI;
use voxel::{LabeledVolume, TissueSet};

/// Everything needed to start one generation run.
#[derive(Debug, Clone)]
pub struct TreeInit {
	pub seed: u64,
	/// Physical box the density field covers. When left equal, the volume's
	/// field of view is used.
	pub density_lo: DVec3,
	pub density_hi: DVec3,
	/// Density field resolution per axis.
	pub fill_resolution: [usize; 3],
	pub start_position: DVec3,
	pub start_direction: DVec3,
	pub start_radius: f64,
	/// Direction growth is rewarded for following.
	pub preferred_direction: DVec3,
	pub tissue: TissueSet,
}

impl TreeInit {
	pub fn new(seed: u64, start_position: DVec3, start_direction: DVec3, start_radius: f64) -> Self {
		Self {
			seed,
			density_lo: DVec3::ZERO,
			density_hi: DVec3::ZERO,
			fill_resolution: [32, 32, 32],
			start_position,
			start_direction,
			start_radius,
			preferred_direction: start_direction,
			tissue: TissueSet::default(),
		}
	}

	pub fn with_density_box(mut self, lo: DVec3, hi: DVec3) -> Self {
		self.density_lo = lo;
		self.density_hi = hi;
		self
	}

	pub fn with_fill_resolution(mut self, fill_resolution: [usize; 3]) -> Self {
		self.fill_resolution = fill_resolution;
		self
	}

	pub fn with_preferred_direction(mut self, preferred_direction: DVec3) -> Self {
		self.preferred_direction = preferred_direction;
		self
	}

	pub fn with_tissue(mut self, tissue: TissueSet) -> Self {
		self.tissue = tissue;
		self
	}
}

/// One grown arterial tree: the branch arena, the density field it maintained,
/// and the parameters that produced it. The labeled volume it grew into is the
/// caller's; vessel voxels were written in place during growth.
pub struct VesselTree {
	config: VesselConfig,
	branches: Vec<Branch>,
	density: DensityField,
	preferred_direction: DVec3,
}

impl VesselTree {
	/// Grows a full tree into `volume`. Validates the config, builds the
	/// density field over the requested box, then recursively grows branches
	/// from the root front. Growth failures prune the tree; only a malformed
	/// config or init is an error.
	pub fn grow(
		config: VesselConfig,
		init: TreeInit,
		volume: &mut LabeledVolume,
	) -> Result<Self, ConfigError> {
		config.validate()?;
		if init.start_radius <= 0.0 {
			return Err(ConfigError::InvalidInit { name: "start_radius" });
		}
		let Some(direction) = init.start_direction.try_normalize() else {
			return Err(ConfigError::InvalidInit { name: "start_direction" });
		};
		if init.fill_resolution.iter().any(|n| *n == 0) {
			return Err(ConfigError::InvalidInit { name: "fill_resolution" });
		}

		let sampler = GrowthSampler::new(init.seed, &config.segment)?;

		let (lo, hi) = if init.density_lo == init.density_hi {
			volume.fov()
		} else {
			(init.density_lo, init.density_hi)
		};
		let mut density = DensityField::new(lo, hi, init.fill_resolution);
		// cells over background or skin, or outside the volume, are never tracked
		let tissue = init.tissue;
		density.deactivate_where(|center| {
			let (vox, _) = volume.world_to_voxel(center);
			match volume.label_at(vox) {
				Some(label) => label == tissue.background || label == tissue.skin,
				None => true,
			}
		});

		let preferred_direction = init.preferred_direction.normalize_or_zero();
		let mut grower = Grower {
			config: &config,
			tissue: &tissue,
			preferred_direction,
			sampler,
			density,
			volume,
			branches: Vec::new(),
		};
		grower.grow_branch(None, 0, 0, GrowthFront {
			position: init.start_position,
			direction,
			radius: init.start_radius,
			derivative: 0.0,
		});

		let branches = grower.branches;
		let density = grower.density;
		log::debug!(
			"grew {} branches / {} segments, total length {:.2}",
			branches.len(),
			branches.iter().map(Branch::segment_count).sum::<usize>(),
			branches.iter().map(|b| b.length).sum::<f64>()
		);
		Ok(Self { config, branches, density, preferred_direction })
	}

	pub fn root(&self) -> &Branch {
		&self.branches[0]
	}

	pub fn branch(&self, id: BranchId) -> &Branch {
		&self.branches[id.0 as usize]
	}

	pub fn branches(&self) -> impl Iterator<Item = &Branch> {
		self.branches.iter()
	}

	pub fn branch_count(&self) -> usize {
		self.branches.len()
	}

	pub fn segment_count(&self) -> usize {
		self.branches.iter().map(Branch::segment_count).sum()
	}

	/// Total accumulated vessel length across the whole tree.
	pub fn total_length(&self) -> f64 {
		self.branches.iter().map(|b| b.length).sum()
	}

	pub fn density(&self) -> &DensityField {
		&self.density
	}

	pub fn config(&self) -> &VesselConfig {
		&self.config
	}

	pub fn preferred_direction(&self) -> DVec3 {
		self.preferred_direction
	}
}

/// Recursive growth state: the arena under construction plus everything the
/// segment search needs. The branch counter is the arena length itself.
struct Grower<'a> {
	config: &'a VesselConfig,
	tissue: &'a TissueSet,
	preferred_direction: DVec3,
	sampler: GrowthSampler,
	density: DensityField,
	volume: &'a mut LabeledVolume,
	branches: Vec<Branch>,
}

impl Grower<'_> {
	/// Grows one branch and, recursively, its whole subtree. Returns the new
	/// branch's handle; the record is filled in before returning.
	fn grow_branch(
		&mut self,
		parent: Option<BranchId>,
		level: u32,
		generation: u32,
		start: GrowthFront,
	) -> BranchId {
		let id = BranchId(self.branches.len() as u32);
		let is_root = parent.is_none();
		self.branches.push(Branch::sprout(id, parent, level, generation, &start));

		let u = self.sampler.uniform();
		let target = branch::target_length(&self.config.branch, level, u);

		// ---------- segment chain ----------
		let mut segments = Vec::new();
		let mut front = start;
		let mut accumulated = 0.0;
		let mut failed = false;
		let mut collided = false;
		loop {
			let segment = SegmentGrower {
				params: &self.config.segment,
				sampler: &mut self.sampler,
				density: &mut self.density,
				volume: &mut *self.volume,
				tissue: self.tissue,
				preferred_direction: self.preferred_direction,
			}
			.grow(front, target - accumulated);
			accumulated += segment.length;
			front = segment.end_front();
			if segment.is_failure() {
				failed = true;
				log::warn!("segment generation failure for branch {}", id.0);
			}
			if self.touches_forbidden_boundary(front.position, is_root) {
				collided = true;
				log::warn!("roi edge collision for branch {}", id.0);
			}
			segments.push(segment);
			if failed || collided || accumulated >= target {
				break;
			}
		}

		// the child-count draw advances the stream before any override
		let mut n_children = self.decide_child_count(front.radius, level, generation);
		if failed || collided {
			n_children = 0;
		}

		let mut children = Vec::with_capacity(n_children);
		if n_children > 0 {
			let radii = self.child_radii(n_children, front.radius);
			for (index, radius) in radii.into_iter().enumerate() {
				let (child_level, direction) = if index == 0 {
					// the continuation child keeps level and direction
					(level, front.direction)
				} else {
					(level + 1, self.draw_child_direction(front.position, front.direction))
				};
				let child = self.grow_branch(Some(id), child_level, generation + 1, GrowthFront {
					position: front.position,
					direction,
					radius,
					derivative: 0.0,
				});
				children.push(child);
			}
		}

		let outcome = if failed {
			GrowthOutcome::SegmentFailure
		} else if collided {
			GrowthOutcome::EdgeCollision
		} else {
			GrowthOutcome::Completed
		};

		let record = &mut self.branches[id.0 as usize];
		record.target_length = target;
		record.length = accumulated;
		record.end_position = front.position;
		record.end_direction = front.direction;
		record.end_radius = front.radius;
		record.segments = segments;
		record.children = children;
		record.outcome = outcome;
		id
	}

	/// Child count, or zero without drawing when a structural limit applies:
	/// the branch is too thin, the tree is at its branch ceiling, or the
	/// generation bound is exceeded.
	fn decide_child_count(&mut self, end_radius: f64, level: u32, generation: u32) -> usize {
		let params = &self.config.branch;
		if end_radius < params.child_min_radius {
			return 0;
		}
		if self.branches.len() as u32 >= self.config.tree.max_branches {
			return 0;
		}
		if generation > self.config.tree.max_generation {
			return 0;
		}
		let u = self.sampler.uniform();
		branch::child_count(params, level, u)
	}

	/// Child radii as fractions of the parent's end radius. The continuation
	/// child takes the fixed fraction without a draw.
	fn child_radii(&mut self, n_children: usize, end_radius: f64) -> Vec<f64> {
		let params = &self.config.branch;
		let mut radii = vec![0.0; n_children];
		radii[0] = end_radius * params.first_child_radius_frac;
		for radius in radii.iter_mut().skip(1) {
			let u = self.sampler.uniform();
			*radius =
				(params.min_radius_frac + u * (params.max_radius_frac - params.min_radius_frac))
					* end_radius;
		}
		radii
	}

	fn draw_child_direction(&mut self, position: DVec3, parent_direction: DVec3) -> DVec3 {
		let params = &self.config.branch;
		let angle_min = PI * params.min_angle_frac;
		let angle_max = PI * params.max_angle_frac;
		let angle = angle_min + self.sampler.uniform() * (angle_max - angle_min);
		let rotation = 2.0 * PI * self.sampler.uniform();
		branch::child_direction(parent_direction, position, angle, rotation)
	}

	/// True when any voxel in the 3x3x3 neighborhood of `position` carries a
	/// forbidden label. Muscle only stops non-root branches; the root grows
	/// off the chest wall. Off-grid neighbors read as background.
	fn touches_forbidden_boundary(&self, position: DVec3, is_root: bool) -> bool {
		let (vox, _) = self.volume.world_to_voxel(position);
		for a in -1..=1 {
			for b in -1..=1 {
				for c in -1..=1 {
					let forbidden = match self.volume.label_at(vox + IVec3::new(a, b, c)) {
						None => true,
						Some(label) => {
							label == self.tissue.background
								|| label == self.tissue.skin
								|| (!is_root && label == self.tissue.muscle)
						}
					};
					if forbidden {
						return true;
					}
				}
			}
		}
		false
	}
}
