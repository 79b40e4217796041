//! Orthonormal Haar wavelet transform over 1-D signals.
//!
//! The input length must be a multiple of `2^levels`.

use std::f64::consts::FRAC_1_SQRT_2;

/// A multi-level decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Coarsest approximation band.
    pub approx: Vec<f64>,
    /// Detail bands, finest first: `details[0]` is band 1.
    pub details: Vec<Vec<f64>>,
}

impl Decomposition {
    /// Detail band `band` (1 = finest).
    pub fn band(&self, band: usize) -> &[f64] {
        &self.details[band - 1]
    }

    pub fn band_mut(&mut self, band: usize) -> &mut [f64] {
        &mut self.details[band - 1]
    }

    pub fn levels(&self) -> usize {
        self.details.len()
    }
}

/// Single-level forward step.
fn split(signal: &[f64]) -> (Vec<f64>, Vec<f64>) {
    signal
        .chunks_exact(2)
        .map(|p| ((p[0] + p[1]) * FRAC_1_SQRT_2, (p[0] - p[1]) * FRAC_1_SQRT_2))
        .unzip()
}

/// Single-level inverse step.
fn merge(approx: &[f64], detail: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(approx.len() * 2);
    for (&a, &d) in approx.iter().zip(detail) {
        out.push((a + d) * FRAC_1_SQRT_2);
        out.push((a - d) * FRAC_1_SQRT_2);
    }
    out
}

pub fn forward(signal: &[f64], levels: usize) -> Decomposition {
    debug_assert_eq!(signal.len() % (1 << levels), 0);
    let mut approx = signal.to_vec();
    let mut details = Vec::with_capacity(levels);
    for _ in 0..levels {
        let (a, d) = split(&approx);
        details.push(d);
        approx = a;
    }
    Decomposition { approx, details }
}

pub fn inverse(decomposition: &Decomposition) -> Vec<f64> {
    decomposition
        .details
        .iter()
        .rev()
        .fold(decomposition.approx.clone(), |approx, detail| merge(&approx, detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_reconstruction() {
        let signal: Vec<f64> = (0..64).map(|i| ((i * 37) % 101) as f64 - 50.0).collect();
        let d = forward(&signal, 4);
        assert_eq!(d.levels(), 4);
        assert_eq!(d.band(1).len(), 32);
        assert_eq!(d.band(3).len(), 8);
        assert_eq!(d.approx.len(), 4);

        let back = inverse(&d);
        for (a, b) in signal.iter().zip(&back) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_energy_is_preserved() {
        let signal: Vec<f64> = (0..32).map(|i| (i as f64 * 0.3).sin() * 1000.0).collect();
        let d = forward(&signal, 3);
        let energy = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>();
        let total = energy(&d.approx) + d.details.iter().map(|b| energy(b)).sum::<f64>();
        assert!((total - energy(&signal)).abs() < 1e-6);
    }

    #[test]
    fn test_constant_signal_has_zero_details() {
        let d = forward(&[5.0; 16], 2);
        assert!(d.details.iter().flatten().all(|&c| c.abs() < 1e-12));
    }
}
