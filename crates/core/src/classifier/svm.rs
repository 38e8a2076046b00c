//! Binary linear SVM fitted with dual coordinate descent (hinge loss, bias
//! folded in as a constant feature).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LinearSvm {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl LinearSvm {
    /// Signed distance-like score; positive means the first class of the pair.
    pub fn decision(&self, x: &[f32]) -> f32 {
        self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + self.bias
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SvmParams {
    /// Soft-margin penalty.
    pub c: f64,
    /// Stop once the projected-gradient spread falls below this.
    pub tolerance: f64,
    pub max_epochs: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            tolerance: 1e-3,
            max_epochs: 1_000,
        }
    }
}

/// Fits `sign(w·x + b)` to `targets` (each +1.0 or -1.0).
///
/// `xs` must be non-empty and rectangular.
pub fn fit_binary(
    xs: &[&[f32]],
    targets: &[f64],
    params: &SvmParams,
    rng: &mut StdRng,
) -> LinearSvm {
    let n = xs.len();
    let dim = xs.first().map(|x| x.len()).unwrap_or(0);
    // Last slot holds the bias weight.
    let mut w = vec![0.0f64; dim + 1];
    let mut alpha = vec![0.0f64; n];
    let q_diag: Vec<f64> = xs
        .iter()
        .map(|x| x.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>() + 1.0)
        .collect();
    let mut order: Vec<usize> = (0..n).collect();

    let mut epochs = 0;
    for _ in 0..params.max_epochs {
        epochs += 1;
        order.shuffle(rng);
        let mut pg_max = f64::NEG_INFINITY;
        let mut pg_min = f64::INFINITY;

        for &i in &order {
            let x = xs[i];
            let y = targets[i];
            let margin = x
                .iter()
                .zip(&w)
                .map(|(v, wj)| f64::from(*v) * wj)
                .sum::<f64>()
                + w[dim];
            let g = y * margin - 1.0;

            let pg = if alpha[i] <= 0.0 {
                g.min(0.0)
            } else if alpha[i] >= params.c {
                g.max(0.0)
            } else {
                g
            };
            pg_max = pg_max.max(pg);
            pg_min = pg_min.min(pg);

            if pg.abs() > 1e-12 {
                let old = alpha[i];
                alpha[i] = (old - g / q_diag[i]).clamp(0.0, params.c);
                let delta = (alpha[i] - old) * y;
                for (wj, v) in w.iter_mut().zip(x) {
                    *wj += delta * f64::from(*v);
                }
                w[dim] += delta;
            }
        }

        if pg_max - pg_min < params.tolerance {
            break;
        }
    }
    tracing::trace!(epochs, samples = n, "binary svm converged");

    LinearSvm {
        weights: w[..dim].iter().map(|v| *v as f32).collect(),
        bias: w[dim] as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn separates_two_clusters() {
        let points: Vec<[f32; 2]> = vec![
            [2.0, 2.1],
            [2.5, 1.8],
            [1.9, 2.6],
            [3.0, 2.2],
            [-2.0, -1.7],
            [-2.4, -2.2],
            [-1.8, -2.9],
            [-3.1, -2.0],
        ];
        let targets = [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0];
        let xs: Vec<&[f32]> = points.iter().map(|p| p.as_slice()).collect();
        let mut rng = StdRng::seed_from_u64(7);

        let svm = fit_binary(&xs, &targets, &SvmParams::default(), &mut rng);
        for (x, t) in xs.iter().zip(targets) {
            assert_eq!(svm.decision(x) > 0.0, t > 0.0, "misclassified {x:?}");
        }
        assert!(svm.decision(&[5.0, 5.0]) > 0.0);
        assert!(svm.decision(&[-5.0, -5.0]) < 0.0);
    }

    #[test]
    fn same_seed_same_model() {
        let points: Vec<[f32; 1]> = vec![[1.0], [2.0], [-1.0], [-2.5]];
        let xs: Vec<&[f32]> = points.iter().map(|p| p.as_slice()).collect();
        let targets = [1.0, 1.0, -1.0, -1.0];
        let a = fit_binary(&xs, &targets, &SvmParams::default(), &mut StdRng::seed_from_u64(1));
        let b = fit_binary(&xs, &targets, &SvmParams::default(), &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}
