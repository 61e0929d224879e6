use crate::config::{ConfigError, SegmentParams};
use rand::{rngs::StdRng, Rng, SeedableRng};
use statrs::distribution::{Beta, ContinuousCDF};

/// The tree's one source of randomness: a seeded uniform stream plus the two
/// Beta quantile maps used for segment length and radius of curvature.
///
/// Determinism of a whole generation run rests on this being a single stream
/// advanced in a fixed order, so the grower threads one instance through every
/// draw it makes.
pub struct GrowthSampler {
	rng: StdRng,
	length_dist: Beta,
	radius_dist: Beta,
}

impl GrowthSampler {
	pub fn new(seed: u64, params: &SegmentParams) -> Result<Self, ConfigError> {
		let length_dist =
			Beta::new(params.length_beta[0], params.length_beta[1]).map_err(|_| {
				ConfigError::BetaShape {
					name: "length_beta",
					a: params.length_beta[0],
					b: params.length_beta[1],
				}
			})?;
		let radius_dist =
			Beta::new(params.radius_beta[0], params.radius_beta[1]).map_err(|_| {
				ConfigError::BetaShape {
					name: "radius_beta",
					a: params.radius_beta[0],
					b: params.radius_beta[1],
				}
			})?;
		Ok(Self { rng: StdRng::seed_from_u64(seed), length_dist, radius_dist })
	}

	/// Next value of the uniform [0, 1) stream. Advances the stream.
	pub fn uniform(&mut self) -> f64 {
		self.rng.random()
	}

	/// Length-distribution quantile of `u`. Pure; does not advance the stream.
	pub fn length_quantile(&self, u: f64) -> f64 {
		quantile(&self.length_dist, u)
	}

	/// Radius-of-curvature-distribution quantile of `u`. Pure.
	pub fn radius_quantile(&self, u: f64) -> f64 {
		quantile(&self.radius_dist, u)
	}
}

/// The inverse CDF is only informative on the open interval; the closed ends
/// must map onto the bracket extremes exactly so rescaled samples can reach
/// both bounds.
fn quantile(dist: &Beta, u: f64) -> f64 {
	if u <= 0.0 {
		0.0
	} else if u >= 1.0 {
		1.0
	} else {
		dist.inverse_cdf(u)
	}
}
