use super::segment::{GrowthFront, Segment};
use crate::config::BranchParams;
use glam::DVec3;

/// Stable handle into a tree's branch arena. Handles are assigned depth-first
/// at branch entry, so a handle doubles as the arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchId(pub u32);

/// How a branch's growth loop ended. Only `Completed` branches may go on to
/// spawn children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthOutcome {
	/// Accumulated length reached the sampled target.
	Completed,
	/// A segment came back zero-length: no candidate arc survived the search.
	SegmentFailure,
	/// The growth front reached the boundary of the valid tissue region.
	EdgeCollision,
}

/// A maximal run of segments sharing one growth regime, plus its place in the
/// tree. A branch always holds at least one segment, even a failed one.
#[derive(Debug, Clone)]
pub struct Branch {
	pub id: BranchId,
	pub parent: Option<BranchId>,
	/// Children in growth order; the first continues the parent's direction.
	pub children: Vec<BranchId>,
	/// Depth counting only bifurcations: the continuation child keeps its
	/// parent's level. Selects the length bracket and probability row.
	pub level: u32,
	/// Depth counting every child; caps the recursion.
	pub generation: u32,
	pub start_position: DVec3,
	pub start_direction: DVec3,
	pub start_radius: f64,
	pub end_position: DVec3,
	pub end_direction: DVec3,
	pub end_radius: f64,
	/// Length drawn for this branch before growth started.
	pub target_length: f64,
	/// Length its segment chain actually accumulated.
	pub length: f64,
	pub segments: Vec<Segment>,
	pub outcome: GrowthOutcome,
}

impl Branch {
	/// Fresh record at branch entry; growth fills in the rest.
	pub(crate) fn sprout(
		id: BranchId,
		parent: Option<BranchId>,
		level: u32,
		generation: u32,
		front: &GrowthFront,
	) -> Self {
		Self {
			id,
			parent,
			children: Vec::new(),
			level,
			generation,
			start_position: front.position,
			start_direction: front.direction,
			start_radius: front.radius,
			end_position: front.position,
			end_direction: front.direction,
			end_radius: front.radius,
			target_length: 0.0,
			length: 0.0,
			segments: Vec::new(),
			outcome: GrowthOutcome::Completed,
		}
	}

	pub fn is_root(&self) -> bool {
		self.parent.is_none()
	}

	pub fn segment_count(&self) -> usize {
		self.segments.len()
	}
}

/// Branch target length: one uniform draw mapped affinely into the level's
/// bracket. Levels three and deeper share the last bracket.
pub(crate) fn target_length(params: &BranchParams, level: u32, u: f64) -> f64 {
	let bucket = (level as usize).min(3);
	params.min_length[bucket] + u * (params.max_length[bucket] - params.min_length[bucket])
}

/// Child count from the cumulative probability table: reverse scan of the
/// clamped level's row, the highest count whose threshold the draw exceeds
/// wins, default zero.
pub(crate) fn child_count(params: &BranchParams, level: u32, u: f64) -> usize {
	let row = &params.child_probabilities[(level as usize).min(params.child_level_bound)];
	for count in (0..params.max_children).rev() {
		if u > row[count] {
			return count + 1;
		}
	}
	0
}

/// Start direction for a non-continuation child: tilted off the parent's end
/// direction by `angle`, rotated about it by `rotation`.
pub(crate) fn child_direction(
	parent_direction: DVec3,
	position: DVec3,
	angle: f64,
	rotation: f64,
) -> DVec3 {
	let (basis1, basis2) = super::segment::perpendicular_basis(parent_direction, position);
	angle.cos() * parent_direction
		+ angle.sin() * (rotation.cos() * basis1 + rotation.sin() * basis2)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::BranchParams;

	#[test]
	fn test_target_length_brackets() {
		let params = BranchParams::default();
		assert_eq!(target_length(&params, 0, 0.0), params.min_length[0]);
		assert_eq!(target_length(&params, 0, 1.0), params.max_length[0]);
		assert_eq!(target_length(&params, 2, 0.5), (params.min_length[2] + params.max_length[2]) / 2.0);
		// deep levels share the default bracket
		assert_eq!(target_length(&params, 3, 0.25), target_length(&params, 9, 0.25));
	}

	#[test]
	fn test_child_count_reverse_scan() {
		let params = BranchParams {
			max_children: 4,
			child_level_bound: 0,
			child_probabilities: vec![vec![0.1, 0.5, 0.9, 0.99]],
			..BranchParams::default()
		};
		assert_eq!(child_count(&params, 0, 0.05), 0);
		assert_eq!(child_count(&params, 0, 0.3), 1);
		assert_eq!(child_count(&params, 0, 0.7), 2);
		assert_eq!(child_count(&params, 0, 0.95), 3);
		assert_eq!(child_count(&params, 0, 0.995), 4);
		// thresholds themselves do not trip: the draw must exceed them
		assert_eq!(child_count(&params, 0, 0.1), 0);
		// deep levels clamp onto the bound's row
		assert_eq!(child_count(&params, 7, 0.7), 2);
	}

	#[test]
	fn test_child_direction_angle() {
		let parent = DVec3::new(0.0, 0.0, 1.0);
		let position = DVec3::new(3.0, 2.0, 5.0);
		for (angle, rotation) in [(0.3, 0.0), (0.3, 2.0), (1.2, 4.5)] {
			let dir = child_direction(parent, position, angle, rotation);
			assert!((dir.length() - 1.0).abs() < 1e-12);
			assert!((dir.dot(parent) - angle.cos()).abs() < 1e-12);
		}
	}

	#[test]
	fn test_child_direction_degenerate_position() {
		// position on the parent axis: the projection of the origin vanishes
		let parent = DVec3::Z;
		let dir = child_direction(parent, DVec3::new(0.0, 0.0, 4.0), 0.5, 1.0);
		assert!((dir.length() - 1.0).abs() < 1e-12);
		assert!((dir.dot(parent) - 0.5f64.cos()).abs() < 1e-12);
	}

	#[test]
	fn test_sprout_invariants() {
		let front = GrowthFront {
			position: DVec3::ONE,
			direction: DVec3::X,
			radius: 0.7,
			derivative: 0.0,
		};
		let branch = Branch::sprout(BranchId(3), Some(BranchId(1)), 2, 5, &front);
		assert_eq!(branch.id, BranchId(3));
		assert!(!branch.is_root());
		assert!(branch.children.is_empty());
		assert_eq!(branch.start_position, branch.end_position);
		assert_eq!(branch.start_radius, 0.7);
	}
}
