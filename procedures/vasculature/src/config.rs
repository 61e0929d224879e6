use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("{name} range is inverted: {min} > {max}")]
	InvertedRange { name: &'static str, min: f64, max: f64 },
	#[error("{name} must be positive, got {value}")]
	NonPositive { name: &'static str, value: f64 },
	#[error("{name} must be at least 1")]
	ZeroBound { name: &'static str },
	#[error("{name} shapes must be positive, got ({a}, {b})")]
	BetaShape { name: &'static str, a: f64, b: f64 },
	#[error("child probability table must be {expected_rows} rows of {expected_cols} entries")]
	ProbabilityTableShape { expected_rows: usize, expected_cols: usize },
	#[error("child probability row {level} must be non-decreasing within [0, 1]")]
	ProbabilityTableRow { level: usize },
	#[error(
		"curvature bracket can invert: max segment length {max_length} forces a radius floor \
		 of {radius_floor}, above max curvature radius {max_radius}"
	)]
	CurvatureBracket { max_length: f64, radius_floor: f64, max_radius: f64 },
	#[error("degenerate init: {name}")]
	InvalidInit { name: &'static str },
}

/// Full parameter set for one generation run. Plain data; an outer binary can
/// deserialize it from whatever format it parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselConfig {
	pub tree: TreeParams,
	pub branch: BranchParams,
	pub segment: SegmentParams,
}

impl VesselConfig {
	/// Rejects parameter combinations that would make sampling degenerate.
	/// Growth assumes a validated config and does not re-check.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.branch.validate()?;
		self.segment.validate()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
	/// Hard ceiling on how many branches one tree may create.
	pub max_branches: u32,
	/// Children are suppressed once a branch's generation exceeds this.
	pub max_generation: u32,
}

impl Default for TreeParams {
	fn default() -> Self {
		Self { max_branches: 500, max_generation: 20 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchParams {
	/// Branch length brackets by tree level: 0, 1, 2, then everything deeper.
	pub min_length: [f64; 4],
	pub max_length: [f64; 4],
	pub max_children: usize,
	/// Levels at or beyond this share the table's last row.
	pub child_level_bound: usize,
	/// Cumulative child-count thresholds, one row per level up to the bound.
	pub child_probabilities: Vec<Vec<f64>>,
	/// Branches thinner than this never split.
	pub child_min_radius: f64,
	/// Radius bracket for non-continuation children, as fractions of the
	/// parent's end radius.
	pub min_radius_frac: f64,
	pub max_radius_frac: f64,
	/// Radius fraction handed to the child that continues the parent's direction.
	pub first_child_radius_frac: f64,
	/// Branch angle bracket as fractions of pi.
	pub min_angle_frac: f64,
	pub max_angle_frac: f64,
}

impl Default for BranchParams {
	fn default() -> Self {
		Self {
			min_length: [20.0, 15.0, 10.0, 5.0],
			max_length: [40.0, 30.0, 25.0, 15.0],
			max_children: 4,
			child_level_bound: 2,
			child_probabilities: vec![
				vec![0.0, 0.3, 0.85, 0.99],
				vec![0.1, 0.5, 0.9, 0.99],
				vec![0.2, 0.6, 0.95, 1.0],
			],
			child_min_radius: 0.03,
			min_radius_frac: 0.5,
			max_radius_frac: 0.8,
			first_child_radius_frac: 0.9,
			min_angle_frac: 0.1,
			max_angle_frac: 0.5,
		}
	}
}

impl BranchParams {
	fn validate(&self) -> Result<(), ConfigError> {
		for bucket in 0..4 {
			positive("branch min_length", self.min_length[bucket])?;
			range("branch length", self.min_length[bucket], self.max_length[bucket])?;
		}
		if self.max_children == 0 {
			return Err(ConfigError::ZeroBound { name: "max_children" });
		}
		positive("min_radius_frac", self.min_radius_frac)?;
		range("child radius fraction", self.min_radius_frac, self.max_radius_frac)?;
		positive("first_child_radius_frac", self.first_child_radius_frac)?;
		range("branch angle fraction", self.min_angle_frac, self.max_angle_frac)?;
		if self.child_probabilities.len() != self.child_level_bound + 1 {
			return Err(ConfigError::ProbabilityTableShape {
				expected_rows: self.child_level_bound + 1,
				expected_cols: self.max_children,
			});
		}
		for (level, row) in self.child_probabilities.iter().enumerate() {
			if row.len() != self.max_children {
				return Err(ConfigError::ProbabilityTableShape {
					expected_rows: self.child_level_bound + 1,
					expected_cols: self.max_children,
				});
			}
			let ordered = row.windows(2).all(|w| w[0] <= w[1]);
			let bounded = row.iter().all(|p| (0.0..=1.0).contains(p));
			if !ordered || !bounded {
				return Err(ConfigError::ProbabilityTableRow { level });
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
	pub min_length: f64,
	pub max_length: f64,
	/// Admissible candidates compared per segment.
	pub num_try: u32,
	/// Raw draws allowed per admissible candidate.
	pub max_try: u32,
	/// Total draws allowed before the segment gives up entirely.
	pub abs_max_try: u32,
	pub max_curvature_radius: f64,
	/// Cap on an arc's turn angle, as a fraction of pi. Together with the
	/// segment length this sets the curvature-radius floor.
	pub max_curvature_frac: f64,
	/// Chord step between containment checks along a candidate arc.
	pub roi_step: f64,
	pub density_weight: f64,
	pub angle_weight: f64,
	/// End radius bracket as fractions of the start radius.
	pub min_end_radius_frac: f64,
	pub max_end_radius_frac: f64,
	/// Beta shape pairs for the length and curvature-radius quantile maps.
	pub length_beta: [f64; 2],
	pub radius_beta: [f64; 2],
}

impl Default for SegmentParams {
	fn default() -> Self {
		Self {
			min_length: 1.0,
			max_length: 5.0,
			num_try: 10,
			max_try: 100,
			abs_max_try: 10_000,
			max_curvature_radius: 75.0,
			max_curvature_frac: 0.25,
			roi_step: 0.2,
			density_weight: 1.0,
			angle_weight: 1.0,
			min_end_radius_frac: 0.95,
			max_end_radius_frac: 1.0,
			length_beta: [2.0, 2.0],
			radius_beta: [2.0, 2.0],
		}
	}
}

impl SegmentParams {
	fn validate(&self) -> Result<(), ConfigError> {
		positive("segment min_length", self.min_length)?;
		range("segment length", self.min_length, self.max_length)?;
		if self.num_try == 0 {
			return Err(ConfigError::ZeroBound { name: "num_try" });
		}
		if self.max_try == 0 {
			return Err(ConfigError::ZeroBound { name: "max_try" });
		}
		if self.abs_max_try == 0 {
			return Err(ConfigError::ZeroBound { name: "abs_max_try" });
		}
		positive("max_curvature_radius", self.max_curvature_radius)?;
		positive("max_curvature_frac", self.max_curvature_frac)?;
		positive("roi_step", self.roi_step)?;
		positive("min_end_radius_frac", self.min_end_radius_frac)?;
		range("end radius fraction", self.min_end_radius_frac, self.max_end_radius_frac)?;
		beta_shapes("length_beta", self.length_beta)?;
		beta_shapes("radius_beta", self.radius_beta)?;
		// the radius bracket [length / (pi * frac), max_radius] must stay
		// ordered for every length a segment can propose
		let radius_floor = self.max_length / (PI * self.max_curvature_frac);
		if radius_floor > self.max_curvature_radius {
			return Err(ConfigError::CurvatureBracket {
				max_length: self.max_length,
				radius_floor,
				max_radius: self.max_curvature_radius,
			});
		}
		Ok(())
	}
}

fn range(name: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
	if min > max {
		return Err(ConfigError::InvertedRange { name, min, max });
	}
	Ok(())
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
	if value <= 0.0 {
		return Err(ConfigError::NonPositive { name, value });
	}
	Ok(())
}

fn beta_shapes(name: &'static str, shapes: [f64; 2]) -> Result<(), ConfigError> {
	if shapes[0] <= 0.0 || shapes[1] <= 0.0 {
		return Err(ConfigError::BetaShape { name, a: shapes[0], b: shapes[1] });
	}
	Ok(())
}
