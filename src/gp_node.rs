use crate::correlation_models::{CorrelationModel, Kernel};
use crate::errors::{DgpError, Result};
use crate::parameters::{GpNodeParams, GpNodeValidParams};

use linfa::prelude::{DatasetBase, Fit};
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{
    concatenate, s, Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2, Zip,
};

use log::trace;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Constant mean terms of a node with a gaussian prior on its mean coefficient
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub(crate) struct MeanBasis {
    /// R^-1.1
    rinv_h: Array1<f64>,
    /// 1^T.R^-1.1 + 1 / mean_prior
    h_rinv_hv: f64,
    /// Posterior mean coefficient
    b: f64,
}

/// Latent training data of a GP node and the statistics derived from it
/// used later on in prediction computations.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub(crate) struct GpState {
    /// Training inputs taken from the previous layer (n, n_input)
    xt: Array2<f64>,
    /// Training inputs taken from the global input (n, n_connect)
    zt: Option<Array2<f64>>,
    /// Training outputs (n,)
    yt: Array1<f64>,
    /// Inverse of the regularized correlation matrix
    rinv: Array2<f64>,
    /// R^-1.(Y - b), reduces to R^-1.Y with zero mean
    res: Array1<f64>,
    /// Mean terms when the node has not a zero mean
    mean_basis: Option<MeanBasis>,
}

/// A trained GP node of a deep gaussian process.
///
/// Hyperparameters are shared between all the snapshots of a node while the
/// latent training data (and derived statistics) are specific to each snapshot.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GpNode {
    /// Kernel configuration with resolved `input_dim` and broadcast `length`
    params: Arc<GpNodeValidParams>,
    state: Arc<GpState>,
}

impl GpNode {
    /// Gp node parameters constructor
    pub fn params(kernel: Kernel) -> GpNodeParams {
        GpNodeParams::new(kernel)
    }

    /// Build a GP node from its hyperparameters and latent training data.
    ///
    /// `x` holds the inputs from the previous layer (or global input for first layer nodes),
    /// `z` the global inputs of the connected dimensions, required iff `connect` is specified.
    pub fn new(
        params: GpNodeValidParams,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        z: Option<&ArrayBase<impl Data<Elem = f64>, Ix2>>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<GpNode> {
        let mut params = params;
        if params.input_dim.is_none() {
            params.input_dim = Some((0..x.ncols()).collect());
        }
        let n_connect = params.connect.as_ref().map_or(0, |c| c.len());
        let dim = x.ncols() + n_connect;
        if params.length.len() == 1 {
            params.length = Array1::from_elem(dim, params.length[0]);
        }
        if params.length.len() != dim {
            return Err(DgpError::InvalidValueError(format!(
                "`length` size ({}) should be 1 or match input dimension ({})",
                params.length.len(),
                dim
            )));
        }
        let params = Arc::new(params);
        let state = Arc::new(compute_stats(&params, x, z, y)?);
        Ok(GpNode { params, state })
    }

    /// Replace the latent training data of this node and recompute its statistics.
    ///
    /// This is the way an imputation sampler moves a node, hyperparameters are unchanged
    /// and remain shared with other snapshots.
    pub fn update_latent(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        z: Option<&ArrayBase<impl Data<Elem = f64>, Ix2>>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<()> {
        self.state = Arc::new(compute_stats(&self.params, x, z, y)?);
        Ok(())
    }

    /// Replace only the training outputs of this node (e.g. latent outputs of
    /// a hidden layer) keeping training inputs.
    pub fn update_output(&mut self, y: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<()> {
        let state = self.state.clone();
        self.update_latent(&state.xt, state.zt.as_ref(), y)
    }

    /// Kernel configuration
    pub fn node_params(&self) -> &GpNodeValidParams {
        &self.params
    }

    /// Columns of the previous layer output used as inputs
    pub fn input_dim(&self) -> &[usize] {
        self.params.input_dim().unwrap_or(&[])
    }

    /// Columns of the global input the node is connected to
    pub fn connect(&self) -> Option<&[usize]> {
        self.params.connect()
    }

    /// Training inputs from the previous layer
    pub fn xt(&self) -> &Array2<f64> {
        &self.state.xt
    }

    /// Training inputs from the global input
    pub fn zt(&self) -> Option<&Array2<f64>> {
        self.state.zt.as_ref()
    }

    /// Training outputs
    pub fn yt(&self) -> &Array1<f64> {
        &self.state.yt
    }

    /// Whether two nodes share the same kernel configuration
    pub fn shares_params(&self, other: &GpNode) -> bool {
        Arc::ptr_eq(&self.params, &other.params)
    }

    fn check_inputs(&self, x: &ArrayView2<f64>, z: Option<&ArrayView2<f64>>) -> Result<()> {
        if x.ncols() != self.state.xt.ncols() {
            return Err(DgpError::InvalidValueError(format!(
                "Expected {} input columns, got {}",
                self.state.xt.ncols(),
                x.ncols()
            )));
        }
        match (&self.state.zt, z) {
            (Some(zt), Some(z)) if zt.ncols() == z.ncols() && z.nrows() == x.nrows() => Ok(()),
            (None, None) => Ok(()),
            _ => Err(DgpError::InvalidValueError(
                "Global input does not match node connection".to_string(),
            )),
        }
    }

    /// Predict mean and variance at deterministic inputs `x` (m, n_input)
    /// and connected global inputs `z` (m, n_connect).
    pub fn gp_prediction(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        z: Option<&ArrayBase<impl Data<Elem = f64>, Ix2>>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let z = z.map(|z| z.view());
        self.check_inputs(&x.view(), z.as_ref())?;
        trace!("GP prediction on {} points", x.nrows());
        let params = &self.params;
        let state = &self.state;

        // r(xt, x): (n, m)
        let r = match (&state.zt, z) {
            (Some(zt), Some(z)) => {
                let xtz = concatenate![Axis(1), state.xt, *zt];
                let xz = concatenate![Axis(1), x.view(), z];
                params.kernel.value(&xtz, &xz, &params.length)
            }
            _ => params.kernel.value(&state.xt, x, &params.length),
        };

        let mut mean = r.t().dot(&state.res);
        let r_rinv_r = (&r * &state.rinv.dot(&r)).sum_axis(Axis(0));
        let mut var = r_rinv_r.mapv(|v| 1. + params.nugget - v);
        if let Some(mb) = &state.mean_basis {
            mean += mb.b;
            let r_rinv_h = r.t().dot(&mb.rinv_h);
            Zip::from(&mut var)
                .and(&r_rinv_h)
                .for_each(|v, rh| *v += (1. - rh) * (1. - rh) / mb.h_rinv_hv);
        }
        var.mapv_inplace(|v| (params.scale * v).abs());
        Ok((mean, var))
    }

    /// Predict mean and variance at uncertain inputs with independent gaussian components
    /// of means `m` (m, n_input) and variances `v` (m, n_input), and deterministic connected
    /// global inputs `z` (m, n_connect).
    pub fn linkgp_prediction(
        &self,
        m: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        v: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        z: Option<&ArrayBase<impl Data<Elem = f64>, Ix2>>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let z = z.map(|z| z.view());
        self.check_inputs(&m.view(), z.as_ref())?;
        if m.dim() != v.dim() {
            return Err(DgpError::InvalidValueError(format!(
                "Input means {:?} and variances {:?} shapes should match",
                m.dim(),
                v.dim()
            )));
        }
        trace!("Linked GP prediction on {} points", m.nrows());

        let mut mean = Array1::<f64>::zeros(m.nrows());
        let mut var = Array1::<f64>::zeros(m.nrows());
        match z {
            Some(z) => Zip::from(&mut mean)
                .and(&mut var)
                .and(m.rows())
                .and(v.rows())
                .and(z.rows())
                .par_for_each(|mu, sigma2, m_i, v_i, z_i| {
                    (*mu, *sigma2) = self.linkgp_row(m_i, v_i, Some(z_i))
                }),
            None => Zip::from(&mut mean)
                .and(&mut var)
                .and(m.rows())
                .and(v.rows())
                .par_for_each(|mu, sigma2, m_i, v_i| {
                    (*mu, *sigma2) = self.linkgp_row(m_i, v_i, None)
                }),
        }
        Ok((mean, var))
    }

    /// Linked prediction of a single test point
    fn linkgp_row(
        &self,
        m: ArrayView1<f64>,
        v: ArrayView1<f64>,
        z: Option<ArrayView1<f64>>,
    ) -> (f64, f64) {
        let params = &self.params;
        let state = &self.state;
        let n_input = state.xt.ncols();
        let length = params.length.slice(s![..n_input]);

        let mut i_vec = params.kernel.expected_value(&state.xt, &m, &v, &length);
        let mut j_mat = params.kernel.expected_product(&state.xt, &m, &v, &length);
        if let (Some(zt), Some(z)) = (&state.zt, z) {
            let kz = params
                .kernel
                .value(zt, &z.insert_axis(Axis(0)), &params.length.slice(s![n_input..]))
                .remove_axis(Axis(1));
            i_vec *= &kz;
            Zip::from(j_mat.rows_mut())
                .and(&kz)
                .for_each(|mut j_k, kz_k| {
                    Zip::from(&mut j_k)
                        .and(&kz)
                        .for_each(|j_kl, kz_l| *j_kl *= kz_k * kz_l)
                });
        }

        let i_res = i_vec.dot(&state.res);
        let res_j_res = state.res.dot(&j_mat.dot(&state.res));
        // R^-1 and J are symmetric: tr(R^-1.J) = sum(R^-1 * J)
        let trace = (&state.rinv * &j_mat).sum();
        let mut sigma2 = 1. + params.nugget - trace;
        let mut mu = i_res;
        if let Some(mb) = &state.mean_basis {
            mu += mb.b;
            let h_rinv_i = mb.rinv_h.dot(&i_vec);
            let h_rinv_j_rinv_h = mb.rinv_h.dot(&j_mat.dot(&mb.rinv_h));
            sigma2 += (1. - 2. * h_rinv_i + h_rinv_j_rinv_h) / mb.h_rinv_hv;
        }
        let var = (res_j_res - i_res * i_res + params.scale * sigma2).abs();
        (mu, var)
    }
}

/// Compute node statistics given kernel configuration and latent training data
fn compute_stats(
    params: &GpNodeValidParams,
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    z: Option<&ArrayBase<impl Data<Elem = f64>, Ix2>>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> Result<GpState> {
    if x.nrows() != y.len() {
        return Err(DgpError::InvalidValueError(format!(
            "Training inputs ({}) and outputs ({}) sizes should match",
            x.nrows(),
            y.len()
        )));
    }
    let zt = match (params.connect(), z) {
        (Some(connect), Some(z)) if z.ncols() == connect.len() && z.nrows() == x.nrows() => {
            Some(z.to_owned())
        }
        (None, None) => None,
        _ => {
            return Err(DgpError::InvalidValueError(
                "Global training input does not match node connection".to_string(),
            ))
        }
    };
    let xt = x.to_owned();
    let r_mx = match &zt {
        Some(zt) => {
            let xz = concatenate![Axis(1), xt, *zt];
            params
                .kernel
                .correlation_matrix(&xz, &params.length, params.nugget)
        }
        None => params
            .kernel
            .correlation_matrix(&xt, &params.length, params.nugget),
    };

    // R^-1 from cholesky decomposition R = L.L^T
    let r_chol = r_mx.cholesky()?;
    let linv = r_chol.solve_triangular(&Array2::<f64>::eye(xt.nrows()), UPLO::Lower)?;
    let rinv = linv.t().dot(&linv);

    let yt = y.to_owned();
    let rinv_y = rinv.dot(&yt);
    let (res, mean_basis) = if params.zero_mean {
        (rinv_y, None)
    } else {
        let rinv_h = rinv.sum_axis(Axis(1));
        let h_rinv_hv = rinv_h.sum() + 1. / params.mean_prior;
        let b = yt.dot(&rinv_h) / h_rinv_hv;
        let res = rinv_y - b * &rinv_h;
        (
            res,
            Some(MeanBasis {
                rinv_h,
                h_rinv_hv,
                b,
            }),
        )
    };

    Ok(GpState {
        xt,
        zt,
        yt,
        rinv,
        res,
        mean_basis,
    })
}

impl fmt::Display for GpNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP({}, length={}, scale={}, nugget={}, input_dim={:?}",
            self.params.kernel,
            self.params.length,
            self.params.scale,
            self.params.nugget,
            self.input_dim()
        )?;
        if let Some(connect) = self.connect() {
            write!(f, ", connect={:?}", connect)?;
        }
        write!(f, ")")
    }
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, DgpError>
    for GpNodeValidParams
{
    type Object = GpNode;

    /// Compute GP node statistics with the given hyperparameters.
    ///
    /// Training records hold the latent inputs first, followed by the connected
    /// global inputs when `connect` is specified.
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>) -> Result<GpNode> {
        let records = dataset.records();
        let n_connect = self.connect().map_or(0, |c| c.len());
        if n_connect > records.ncols() {
            return Err(DgpError::InvalidValueError(format!(
                "Training records ({} columns) cannot hold {} connected inputs",
                records.ncols(),
                n_connect
            )));
        }
        let n_input = records.ncols() - n_connect;
        let x = records.slice(s![.., ..n_input]);
        let z = self.connect().map(|_| records.slice(s![.., n_input..]));
        if let Some(input_dim) = self.input_dim() {
            if input_dim.len() != n_input {
                return Err(DgpError::InvalidValueError(format!(
                    "`input_dim` size ({}) should match training input columns ({})",
                    input_dim.len(),
                    n_input
                )));
            }
        }
        GpNode::new(self.clone(), &x, z.as_ref(), dataset.targets())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use linfa::{Dataset, ParamGuard};
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    fn fit_node(params: GpNodeParams, xt: Array2<f64>, yt: Array1<f64>) -> GpNode {
        params
            .check()
            .unwrap()
            .fit(&Dataset::new(xt, yt))
            .expect("GP node fit")
    }

    #[test]
    fn test_single_point_interpolation() {
        let node = fit_node(
            GpNode::params(Kernel::SquaredExponential)
                .length(array![1.])
                .scale(1.)
                .nugget(1e-6),
            array![[0.]],
            array![1.],
        );
        let (mean, var) = node.gp_prediction(&array![[0.]], None::<&Array2<f64>>).unwrap();
        assert_abs_diff_eq!(mean[0], 1. / (1. + 1e-6), epsilon = 1e-12);
        assert_abs_diff_eq!(var[0], 1. + 1e-6 - 1. / (1. + 1e-6), epsilon = 1e-12);
        assert!(var[0] < 1e-5);
    }

    #[test]
    fn test_single_point_zero_nugget() {
        let node = fit_node(
            GpNode::params(Kernel::Matern52).nugget(0.),
            array![[0.3, -0.2]],
            array![2.5],
        );
        let (mean, var) = node
            .gp_prediction(&array![[0.3, -0.2]], None::<&Array2<f64>>)
            .unwrap();
        assert_abs_diff_eq!(mean[0], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(var[0], 0., epsilon = 1e-12);
    }

    #[test]
    fn test_far_from_data_reverts_to_prior() {
        let node = fit_node(
            GpNode::params(Kernel::SquaredExponential)
                .length(array![0.2])
                .scale(2.),
            array![[0.], [0.5], [1.]],
            array![1., -1., 0.5],
        );
        let (mean, var) = node.gp_prediction(&array![[10.]], None::<&Array2<f64>>).unwrap();
        assert_abs_diff_eq!(mean[0], 0., epsilon = 1e-12);
        assert_abs_diff_eq!(var[0], 2. * (1. + 1e-6), epsilon = 1e-12);
    }

    #[test]
    fn test_non_zero_mean() {
        let params = GpNode::params(Kernel::SquaredExponential)
            .length(array![0.2])
            .zero_mean(false)
            .mean_prior(1e6);
        let node = fit_node(params, array![[0.], [0.5], [1.]], array![3., 3.2, 2.9]);
        // far from data, mean reverts to the estimated constant
        let (mean, _) = node.gp_prediction(&array![[10.]], None::<&Array2<f64>>).unwrap();
        let mb = node.state.mean_basis.as_ref().unwrap();
        assert_abs_diff_eq!(mean[0], mb.b, epsilon = 1e-12);
        assert!(mb.b > 2.5 && mb.b < 3.5);
        // still interpolates
        let (mean, _) = node
            .gp_prediction(&array![[0.5]], None::<&Array2<f64>>)
            .unwrap();
        assert_abs_diff_eq!(mean[0], 3.2, epsilon = 1e-4);
    }

    #[test]
    fn test_overlapping_connect_fails() {
        let res = GpNode::params(Kernel::SquaredExponential)
            .input_dim(vec![0, 1])
            .connect(vec![0])
            .check();
        assert!(res.is_err());
    }

    #[test]
    fn test_connect_requires_global_input() {
        let params = GpNode::params(Kernel::SquaredExponential)
            .input_dim(vec![0])
            .connect(vec![1])
            .check()
            .unwrap();
        let res = GpNode::new(params, &array![[0.], [1.]], None::<&Array2<f64>>, &array![0., 1.]);
        assert!(res.is_err());
    }

    #[test]
    fn test_bad_length_size() {
        let params = GpNode::params(Kernel::SquaredExponential)
            .length(array![1., 2., 3.])
            .check()
            .unwrap();
        let res = params.fit(&Dataset::new(array![[0., 1.], [1., 0.]], array![0., 1.]));
        assert!(matches!(res, Err(DgpError::InvalidValueError(_))));
    }

    #[test]
    fn test_update_latent_keeps_params_shared() {
        let node = fit_node(
            GpNode::params(Kernel::Matern52),
            array![[0.], [1.]],
            array![0., 1.],
        );
        let mut moved = node.clone();
        moved.update_output(&array![2., 3.]).unwrap();
        assert!(moved.shares_params(&node));
        assert_eq!(node.yt(), &array![0., 1.]);
        assert_eq!(moved.yt(), &array![2., 3.]);
        let (mean, _) = moved
            .gp_prediction(&array![[1.]], None::<&Array2<f64>>)
            .unwrap();
        assert_abs_diff_eq!(mean[0], 3., epsilon = 1e-4);
    }

    #[test]
    fn test_linkgp_small_variance_far_from_data() {
        for kernel in [Kernel::SquaredExponential, Kernel::Matern52] {
            let node = fit_node(
                GpNode::params(kernel).length(array![0.01]),
                array![[0.], [0.02], [0.05]],
                array![1., -0.5, 0.3],
            );
            let x = array![[5.], [-3.], [0.02]];
            let (mean, var) = node.gp_prediction(&x, None::<&Array2<f64>>).unwrap();
            let (link_mean, link_var) = node
                .linkgp_prediction(&x, &Array2::from_elem((3, 1), 1e-8), None::<&Array2<f64>>)
                .unwrap();
            assert!(link_mean.iter().chain(link_var.iter()).all(|v| v.is_finite()));
            assert_abs_diff_eq!(link_mean, mean, epsilon = 1e-3);
            assert_abs_diff_eq!(link_var, var, epsilon = 1e-3);
            assert_abs_diff_eq!(link_var[0], 1. + 1e-6, epsilon = 1e-12);
        }
    }

    macro_rules! test_link_zero_variance {
        ($kernel:ident, $mean:ident, $zero_mean:expr) => {
            paste! {
                #[test]
                fn [<test_linkgp_zero_variance_ $kernel:snake _ $mean>]() {
                    let mut rng = Xoshiro256Plus::seed_from_u64(42);
                    let xt = Array::random_using((12, 3), Uniform::new(0., 1.), &mut rng);
                    let yt = xt.map_axis(Axis(1), |r| (3_f64 * r[0]).sin() + r[1] * r[2] + r[2]);
                    let params = GpNode::params(Kernel::$kernel)
                        .length(array![0.4, 0.7, 1.1])
                        .scale(1.3)
                        .nugget(1e-4)
                        .zero_mean($zero_mean)
                        .input_dim(vec![0, 2])
                        .connect(vec![1]);
                    let node = fit_node(params, xt, yt);

                    let x = Array::random_using((5, 3), Uniform::new(0., 1.), &mut rng);
                    let m = x.select(Axis(1), &[0, 1]);
                    let z = x.slice(s![.., 2..]);
                    let (mean, var) = node.gp_prediction(&m, Some(&z)).unwrap();
                    let (link_mean, link_var) = node
                        .linkgp_prediction(&m, &Array2::zeros((5, 2)), Some(&z))
                        .unwrap();
                    assert_abs_diff_eq!(link_mean, mean, epsilon = 1e-7);
                    assert_abs_diff_eq!(link_var, var, epsilon = 1e-6);

                    let (tiny_mean, tiny_var) = node
                        .linkgp_prediction(&m, &Array2::from_elem((5, 2), 1e-12), Some(&z))
                        .unwrap();
                    assert_abs_diff_eq!(tiny_mean, mean, epsilon = 1e-5);
                    assert_abs_diff_eq!(tiny_var, var, epsilon = 1e-5);
                }
            }
        };
    }

    test_link_zero_variance!(SquaredExponential, zero_mean, true);
    test_link_zero_variance!(SquaredExponential, constant_mean, false);
    test_link_zero_variance!(Matern52, zero_mean, true);
    test_link_zero_variance!(Matern52, constant_mean, false);

    /// Monte Carlo estimation of linked prediction moments
    fn mc_linked_moments(
        node: &GpNode,
        m: &Array2<f64>,
        v: &Array2<f64>,
        n: usize,
    ) -> (f64, f64) {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let eps = Array::random_using(
            (n, m.ncols()),
            ndarray_rand::rand_distr::StandardNormal,
            &mut rng,
        );
        let x = &eps * &v.row(0).mapv(f64::sqrt) + &m.row(0);
        let (mu, sigma2) = node.gp_prediction(&x, None::<&Array2<f64>>).unwrap();
        let mean = mu.mean().unwrap();
        let var = (&sigma2 + &mu.mapv(|v| v * v)).mean().unwrap() - mean * mean;
        (mean, var)
    }

    #[test]
    fn test_linkgp_against_monte_carlo() {
        let xt = array![[0.], [0.3], [0.6], [1.]];
        let yt = array![0.5, -0.2, 0.8, 0.1];
        for kernel in [Kernel::SquaredExponential, Kernel::Matern52] {
            let node = fit_node(
                GpNode::params(kernel).length(array![0.5]).scale(0.8),
                xt.clone(),
                yt.clone(),
            );
            let m = array![[0.45]];
            let v = array![[0.04]];
            let (mean, var) = node
                .linkgp_prediction(&m, &v, None::<&Array2<f64>>)
                .unwrap();
            let (mc_mean, mc_var) = mc_linked_moments(&node, &m, &v, 200_000);
            assert_abs_diff_eq!(mean[0], mc_mean, epsilon = 5e-3);
            assert_abs_diff_eq!(var[0], mc_var, epsilon = 5e-3);
        }
    }
}
