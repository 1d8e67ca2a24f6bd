//! Deterministic distribution sampling over a `RngCore` stream.
//!
//! These draw directly from 64-bit RNG output so that a given seed always
//! yields the same observation sequence, on every platform. The cutover
//! constants (e.g. the Poisson normal approximation) are part of the
//! reproducibility contract and must not change between releases.

use rand_core::RngCore;

/// Poisson means above this use the normal approximation; below it,
/// Knuth's product-of-uniforms method stays exact and cheap.
const POISSON_NORMAL_CUTOVER: f64 = 30.0;

/// Uniform draw on the open interval (0, 1).
///
/// 53 mantissa bits, offset by half a step so neither endpoint can occur;
/// safe as input to `ln` and Box-Muller.
pub fn uniform_open01(rng: &mut impl RngCore) -> f64 {
    const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
    ((rng.next_u64() >> 11) as f64 + 0.5) * SCALE
}

/// Uniform draw on [lo, hi).
pub fn uniform_range(rng: &mut impl RngCore, lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) * uniform_open01(rng)
}

/// Standard normal draw via Box-Muller.
///
/// The second Box-Muller value is discarded rather than cached so a
/// generator's draw count per tick stays fixed.
pub fn standard_normal(rng: &mut impl RngCore) -> f64 {
    let u1 = uniform_open01(rng);
    let u2 = uniform_open01(rng);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Poisson draw with the given mean.
pub fn poisson(rng: &mut impl RngCore, mean: f64) -> u64 {
    if mean <= 0.0 {
        return 0;
    }
    if mean < POISSON_NORMAL_CUTOVER {
        // Knuth: count uniforms until their product drops below e^-mean.
        let limit = (-mean).exp();
        let mut product = uniform_open01(rng);
        let mut k = 0u64;
        while product > limit {
            product *= uniform_open01(rng);
            k += 1;
        }
        k
    } else {
        let draw = mean + mean.sqrt() * standard_normal(rng);
        draw.round().max(0.0) as u64
    }
}

/// Exponential draw with rate `lambda` (inverse CDF).
pub fn exponential(rng: &mut impl RngCore, lambda: f64) -> f64 {
    -uniform_open01(rng).ln() / lambda
}

/// Lognormal draw with log-space mean `mu` and deviation `sigma`.
pub fn lognormal(rng: &mut impl RngCore, mu: f64, sigma: f64) -> f64 {
    (mu + sigma * standard_normal(rng)).exp()
}
