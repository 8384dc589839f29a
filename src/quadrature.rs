//! Gauss-Hermite quadrature used to integrate likelihoods against the gaussian
//! predictive distribution of latent inputs.

use crate::parameters::GH_N_POINTS;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1, Zip};
use std::f64::consts::{PI, SQRT_2};

/// Positive roots of the 10th physicists' Hermite polynomial
const GH_HALF_NODES: [f64; GH_N_POINTS / 2] = [
    0.3429013272237046,
    1.0366108297895137,
    1.7566836492998818,
    2.5327316742327897,
    3.4361591188377376,
];

/// Weights associated to [`GH_HALF_NODES`]
const GH_HALF_WEIGHTS: [f64; GH_N_POINTS / 2] = [
    0.6108626337353258,
    0.2401386110823147,
    0.03387439445548106,
    0.0013436457467812327,
    7.640432855232621e-06,
];

/// Tensor product Gauss-Hermite rule in `n_dim` dimensions.
///
/// The rule integrates `f(x).exp(-|x|^2)`; weights include the `PI^(-n_dim/2)`
/// normalization such that [`GaussHermite::expectation`] returns gaussian expectations.
#[derive(Clone, Debug)]
pub struct GaussHermite {
    /// Quadrature points (GH_N_POINTS^n_dim, n_dim)
    points: Array2<f64>,
    /// Normalized weights (GH_N_POINTS^n_dim,)
    weights: Array1<f64>,
}

impl GaussHermite {
    /// Build the rule for `n_dim` independent latent dimensions
    pub fn new(n_dim: usize) -> GaussHermite {
        let (nodes_1d, weights_1d) = nodes_and_weights();
        let n_points = GH_N_POINTS.pow(n_dim as u32);
        let norm = PI.powf(-(n_dim as f64) / 2.);
        let mut points = Array2::zeros((n_points, n_dim));
        let mut weights = Array1::from_elem(n_points, norm);
        // last dimension varies fastest
        for (k, (mut point, w)) in points
            .rows_mut()
            .into_iter()
            .zip(weights.iter_mut())
            .enumerate()
        {
            let mut idx = k;
            for d in (0..n_dim).rev() {
                let i = idx % GH_N_POINTS;
                idx /= GH_N_POINTS;
                point[d] = nodes_1d[i];
                *w *= weights_1d[i];
            }
        }
        GaussHermite { points, weights }
    }

    /// Quadrature points
    pub fn points(&self) -> &Array2<f64> {
        &self.points
    }

    /// Normalized quadrature weights
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Map quadrature points to the gaussian of given `mean` (n_dim,) and `var` (n_dim,),
    /// i.e. `sqrt(2.var).x + mean`
    pub fn grid(
        &self,
        mean: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        var: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array2<f64> {
        let scale = var.mapv(|v| SQRT_2 * v.abs().sqrt());
        &self.points * &scale + mean
    }

    /// Expectation of `f` against independent gaussians of given `mean` and `var`,
    /// `f` being evaluated at every point of the mapped grid (n_points, n_dim) at once
    pub fn expectation(
        &self,
        mean: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        var: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        f: impl Fn(&Array2<f64>) -> Array1<f64>,
    ) -> f64 {
        self.weights.dot(&f(&self.grid(mean, var)))
    }

    /// Row-wise expectations of `exp(log_f(y_i, .))` where the gaussian of row `i` is given
    /// by `mean` (n, n_dim) and `var` (n, n_dim)
    pub fn diag_expectation(
        &self,
        mean: &Array2<f64>,
        var: &Array2<f64>,
        y: &ArrayView1<f64>,
        log_f: impl Fn(f64, &Array2<f64>) -> Array1<f64> + Sync,
    ) -> Array1<f64> {
        let mut res = Array1::zeros(y.len());
        Zip::from(&mut res)
            .and(mean.rows())
            .and(var.rows())
            .and(y)
            .par_for_each(|r, m_i, v_i, y_i| {
                *r = self.expectation(&m_i, &v_i, |grid| log_f(*y_i, grid).mapv(f64::exp))
            });
        res
    }
}

/// 1D nodes and weights in increasing order of nodes
fn nodes_and_weights() -> ([f64; GH_N_POINTS], [f64; GH_N_POINTS]) {
    let half = GH_N_POINTS / 2;
    let mut nodes = [0.; GH_N_POINTS];
    let mut weights = [0.; GH_N_POINTS];
    for i in 0..half {
        nodes[half - 1 - i] = -GH_HALF_NODES[i];
        weights[half - 1 - i] = GH_HALF_WEIGHTS[i];
        nodes[half + i] = GH_HALF_NODES[i];
        weights[half + i] = GH_HALF_WEIGHTS[i];
    }
    (nodes, weights)
}
