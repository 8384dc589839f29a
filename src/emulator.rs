use crate::errors::{DgpError, Result};
use crate::network::{select_columns, LayerMoments, Network, Node};
use crate::parameters::DEFAULT_BURNIN;
use crate::quadrature::GaussHermite;
use crate::types::{Method, Prediction};
use crate::utils::{
    concat_predictions, default_chunk_num, default_rng, dispatch_chunks, draw_normal,
    jump_streams, RngRef,
};

use log::{debug, info};
use ndarray::{concatenate, s, stack, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

#[cfg(feature = "persistent")]
use crate::types::GpFileFormat;
#[cfg(feature = "persistent")]
use std::fs;
#[cfg(feature = "persistent")]
use std::io::Write;

/// An imputation sampler moving the latent variables of a network.
///
/// Implementors update GP nodes through [`GpNode::update_latent`](crate::GpNode::update_latent)
/// which keeps kernel configuration shared between successive snapshots.
pub trait Imputer {
    /// Run `n_steps` steps whose states are discarded
    fn burn_in(&mut self, network: &mut Network, n_steps: usize) -> Result<()> {
        for _ in 0..n_steps {
            self.step(network)?;
        }
        Ok(())
    }

    /// Run one step of the sampler
    fn step(&mut self, network: &mut Network) -> Result<()>;
}

/// An imputer leaving the latent variables unchanged.
///
/// Snapshots are identical which reduces emulation to the propagation of a single network.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticImputer;

impl Imputer for StaticImputer {
    fn step(&mut self, _network: &mut Network) -> Result<()> {
        Ok(())
    }
}

/// Position-wise description of a network: node kind, `input_dim` and `connect`
type NodeLayout = (bool, Vec<usize>, Option<Vec<usize>>);

fn layout(network: &Network) -> Vec<Vec<NodeLayout>> {
    network
        .layers()
        .iter()
        .map(|layer| {
            layer
                .iter()
                .map(|node| {
                    (
                        matches!(node, Node::Gp(_)),
                        node.input_dim().to_vec(),
                        node.connect().map(|c| c.to_vec()),
                    )
                })
                .collect()
        })
        .collect()
}

/// A deep gaussian process emulator.
///
/// Predictions are averaged over imputed snapshots of a trained network.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Emulator {
    /// Imputed networks, read-only once built
    snapshots: Vec<Network>,
    /// Random generator used in sampling mode
    #[cfg_attr(feature = "serializable", serde(skip, default = "default_rng"))]
    rng: RngRef,
}

impl Emulator {
    /// Build an emulator from `n_imputations` snapshots of `network` generated by `imputer`
    /// after [`DEFAULT_BURNIN`] burn-in steps
    pub fn new(
        network: Network,
        imputer: &mut impl Imputer,
        n_imputations: usize,
    ) -> Result<Emulator> {
        Self::new_with_burnin(network, imputer, n_imputations, DEFAULT_BURNIN)
    }

    /// Build an emulator from `n_imputations` snapshots of `network` generated by `imputer`
    /// after `burnin` burn-in steps
    pub fn new_with_burnin(
        network: Network,
        imputer: &mut impl Imputer,
        n_imputations: usize,
        burnin: usize,
    ) -> Result<Emulator> {
        let mut network = network;
        imputer.burn_in(&mut network, burnin)?;
        let mut snapshots = Vec::with_capacity(n_imputations);
        for _ in 0..n_imputations {
            imputer.step(&mut network)?;
            snapshots.push(network.clone());
        }
        info!(
            "Emulator built with {} imputations after {} burn-in steps",
            n_imputations, burnin
        );
        Self::from_snapshots(snapshots)
    }

    /// Build an emulator from already imputed networks sharing the same structure
    pub fn from_snapshots(snapshots: Vec<Network>) -> Result<Emulator> {
        let first = snapshots.first().ok_or_else(|| {
            DgpError::InvalidValueError("Emulator requires at least one imputation".to_string())
        })?;
        let expected = layout(first);
        if snapshots.iter().skip(1).any(|n| layout(n) != expected) {
            return Err(DgpError::InvalidValueError(
                "Imputed networks should share the same structure".to_string(),
            ));
        }
        Ok(Emulator {
            snapshots,
            rng: default_rng(),
        })
    }

    /// Set random generator used in sampling mode
    pub fn with_rng(mut self, rng: Xoshiro256Plus) -> Self {
        self.rng = Arc::new(RwLock::new(rng));
        self
    }

    /// Imputed networks
    pub fn snapshots(&self) -> &[Network] {
        &self.snapshots
    }

    /// Number of imputed networks
    pub fn n_imputations(&self) -> usize {
        self.snapshots.len()
    }

    fn network(&self) -> &Network {
        &self.snapshots[0]
    }

    /// Predict at test points `x` (n, nx).
    ///
    /// With [`Method::MeanVar`], means and variances are combined over imputations with
    /// the law of total variance. With [`Method::Sampling`], `sample_size` samples are drawn
    /// per imputation. When `full_layer` is true, predictions of every layer are returned.
    ///
    /// Sampling draws from a stream split off the emulator generator, which stays
    /// unlocked while predicting.
    pub fn predict(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        method: Method,
        full_layer: bool,
        sample_size: usize,
    ) -> Result<Prediction> {
        let x = x.view();
        match method {
            Method::MeanVar => self.mean_var(&x, full_layer),
            Method::Sampling => {
                let mut rng = self.stream()?;
                self.sampling(&x, full_layer, sample_size, &mut rng)
            }
        }
    }

    /// Parallel version of [`Emulator::predict`].
    ///
    /// Test points are split in `chunk_num` chunks (default to chunks of at most
    /// [`DEFAULT_CHUNK_SIZE`](crate::DEFAULT_CHUNK_SIZE) points) processed by at most
    /// `core_num` workers (default to available cores minus one). Each chunk samples
    /// with its own random stream.
    pub fn ppredict(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        method: Method,
        full_layer: bool,
        sample_size: usize,
        chunk_num: Option<usize>,
        core_num: Option<usize>,
    ) -> Result<Prediction> {
        let x = x.view();
        let chunk_num = chunk_num.unwrap_or_else(|| default_chunk_num(x.nrows()));
        let rngs = match method {
            Method::MeanVar => vec![],
            Method::Sampling => jump_streams(&self.rng, chunk_num.max(1))?,
        };
        let parts = dispatch_chunks(x.nrows(), Some(chunk_num), core_num, |i, range| {
            let x = x.slice(s![range, ..]);
            match rngs.get(i) {
                Some(rng) => self.sampling(&x, full_layer, sample_size, &mut rng.clone()),
                None => self.mean_var(&x, full_layer),
            }
        })?;
        concat_predictions(parts)
    }

    /// A random stream of its own for one prediction
    fn stream(&self) -> Result<Xoshiro256Plus> {
        jump_streams(&self.rng, 1)?
            .pop()
            .ok_or_else(|| DgpError::SampleError("No random stream available".to_string()))
    }

    fn mean_var(&self, x: &ArrayView2<f64>, full_layer: bool) -> Result<Prediction> {
        let moments = self
            .snapshots
            .par_iter()
            .map(|network| network.propagate(x, full_layer))
            .collect::<Result<Vec<_>>>()?;
        let n = moments.len() as f64;
        let n_layers = moments[0].len();
        let (mut means, mut vars) = (Vec::with_capacity(n_layers), Vec::with_capacity(n_layers));
        for l in 0..n_layers {
            let mut mean = Array2::<f64>::zeros(moments[0][l].mean.dim());
            let mut second = Array2::<f64>::zeros(moments[0][l].mean.dim());
            for imputation in &moments {
                let LayerMoments { mean: m, var: v } = &imputation[l];
                mean += m;
                second += &(m * m + v);
            }
            mean /= n;
            second /= n;
            let var = second - &mean * &mean;
            means.push(mean);
            vars.push(var);
        }
        if full_layer {
            Ok(Prediction::LayerMeanVar {
                mean: means,
                var: vars,
            })
        } else {
            Ok(Prediction::MeanVar {
                mean: means.remove(0),
                var: vars.remove(0),
            })
        }
    }

    fn sampling<R: Rng>(
        &self,
        x: &ArrayView2<f64>,
        full_layer: bool,
        sample_size: usize,
        rng: &mut R,
    ) -> Result<Prediction> {
        if sample_size == 0 {
            return Err(DgpError::InvalidValueError(
                "`sample_size` should be positive".to_string(),
            ));
        }
        let n_layers = self.network().n_layers();
        let moments = self
            .snapshots
            .par_iter()
            .map(|network| network.propagate_layers(x, n_layers))
            .collect::<Result<Vec<_>>>()?;

        // (imputation, layer, node) samples of shape (n, sample_size)
        let samples = moments
            .iter()
            .map(|m| self.sample_imputation(m, full_layer, sample_size, rng))
            .collect::<Result<Vec<_>>>()?;

        let mut layers = vec![];
        for l in 0..samples[0].len() {
            let mut nodes = vec![];
            for j in 0..samples[0][l].len() {
                let views: Vec<ArrayView2<f64>> =
                    samples.iter().map(|s| s[l][j].view()).collect();
                nodes.push(
                    concatenate(Axis(1), &views)
                        .map_err(|e| DgpError::SampleError(e.to_string()))?,
                );
            }
            layers.push(nodes);
        }
        debug!(
            "Sampled {} layers with {} samples per imputation",
            layers.len(),
            sample_size
        );
        if full_layer {
            Ok(Prediction::LayerSamples(layers))
        } else {
            Ok(Prediction::Samples(layers.remove(0)))
        }
    }

    /// Draw samples of one imputation given its layer moments
    fn sample_imputation<R: Rng>(
        &self,
        moments: &[LayerMoments],
        full_layer: bool,
        sample_size: usize,
        rng: &mut R,
    ) -> Result<Vec<Vec<Array2<f64>>>> {
        let l_out = moments.len() - 1;
        let mut layers: Vec<Vec<Array2<f64>>> = vec![];
        if full_layer {
            for layer in &moments[..l_out] {
                let nodes = (0..layer.mean.ncols())
                    .map(|j| {
                        draw_normal(&layer.mean.column(j), &layer.var.column(j), sample_size, rng)
                    })
                    .collect();
                layers.push(nodes);
            }
        }

        let out = &moments[l_out];
        let mut outputs = vec![];
        for (j, node) in self.network().output_layer().iter().enumerate() {
            let samples = match node {
                Node::Gp(_) => {
                    draw_normal(&out.mean.column(j), &out.var.column(j), sample_size, rng)
                }
                Node::Likelihood(lik) => {
                    let mut samples = Array2::zeros((out.mean.nrows(), sample_size));
                    // likelihood nodes are never in the first layer
                    let latent = &moments[l_out - 1];
                    let m = select_columns(&latent.mean.view(), lik.input_dim())?;
                    let v = select_columns(&latent.var.view(), lik.input_dim())?;
                    for r in 0..sample_size {
                        let f = match layers.last() {
                            Some(hidden) if full_layer => {
                                let cols: Vec<_> =
                                    lik.input_dim().iter().map(|&i| hidden[i].column(r)).collect();
                                stack(Axis(1), &cols)
                                    .map_err(|e| DgpError::SampleError(e.to_string()))?
                            }
                            _ => {
                                let eps = Array2::<f64>::random_using(m.dim(), StandardNormal, rng);
                                eps * v.mapv(f64::sqrt) + &m
                            }
                        };
                        samples.column_mut(r).assign(&lik.sampling(&f, rng)?);
                    }
                    samples
                }
            };
            outputs.push(samples);
        }
        layers.push(outputs);
        Ok(layers)
    }

    /// Negative predictive log-likelihood of observations `y` (n,) at test points `x` (n, nx).
    ///
    /// The output layer should consist of exactly one likelihood node. The likelihood is
    /// integrated against the predictive distribution of its latent inputs with
    /// Gauss-Hermite quadrature then averaged over imputations.
    /// Returns the mean over test points and the pointwise values.
    pub fn nllik(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<(f64, Array1<f64>)> {
        let network = self.network();
        let lik = match network.output_layer().as_slice() {
            [Node::Likelihood(lik)] => lik,
            _ => {
                return Err(DgpError::NllikError(
                    "Output layer should consist of exactly one likelihood node".to_string(),
                ))
            }
        };
        if x.nrows() != y.len() {
            return Err(DgpError::InvalidValueError(format!(
                "Test inputs ({}) and observations ({}) sizes should match",
                x.nrows(),
                y.len()
            )));
        }
        let gh = GaussHermite::new(lik.input_dim().len());
        let y = y.view();
        let x = x.view();
        let n_hidden = network.n_layers() - 1;
        let liks = self
            .snapshots
            .par_iter()
            .map(|network| {
                let moments = network.propagate_layers(&x, n_hidden)?;
                let latent = &moments[n_hidden - 1];
                let m = select_columns(&latent.mean.view(), lik.input_dim())?;
                let v = select_columns(&latent.var.view(), lik.input_dim())?;
                Ok(gh.diag_expectation(&m, &v, &y, |y_i, grid| {
                    lik.pointwise_log_likelihood(y_i, grid)
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        let n = liks.len() as f64;
        let mean_lik = liks.iter().fold(Array1::<f64>::zeros(y.len()), |acc, l| acc + l) / n;
        let nllik = mean_lik.mapv(|l| -l.ln());
        Ok((nllik.mean().unwrap_or(f64::NAN), nllik))
    }
}

#[cfg(feature = "persistent")]
impl Emulator {
    /// Save emulator in given file.
    pub fn save(&self, path: &str, format: GpFileFormat) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = match format {
            GpFileFormat::Json => serde_json::to_vec(self)?,
            GpFileFormat::Binary => bincode::serialize(self)?,
        };
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Load emulator from given file.
    pub fn load(path: &str, format: GpFileFormat) -> Result<Box<Emulator>> {
        let data = fs::read(path)?;
        let emulator = match format {
            GpFileFormat::Json => serde_json::from_slice(&data)?,
            GpFileFormat::Binary => bincode::deserialize(&data)?,
        };
        Ok(Box::new(emulator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation_models::Kernel;
    use crate::gp_node::GpNode;
    use crate::likelihoods::{Likelihood, LikelihoodNode};
    use crate::network::tests::two_layers_network;
    use crate::parameters::DEFAULT_SAMPLE_SIZE;
    use approx::assert_abs_diff_eq;
    use linfa::ParamGuard;
    use ndarray::{array, Array, Zip};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use std::f64::consts::PI;

    /// Imputer jittering hidden layer latent outputs, next layer inputs follow
    struct JitterImputer {
        rng: Xoshiro256Plus,
        scale: f64,
    }

    impl Imputer for JitterImputer {
        fn step(&mut self, network: &mut Network) -> Result<()> {
            let layers = network.layers_mut();
            if layers.len() < 2 {
                return Ok(());
            }
            let mut outputs = vec![];
            for node in layers[0].iter_mut() {
                if let Some(gp) = node.as_gp_mut() {
                    let eps =
                        Array1::<f64>::random_using(gp.yt().len(), StandardNormal, &mut self.rng);
                    let w = gp.yt() + &(eps * self.scale);
                    gp.update_output(&w)?;
                    outputs.push(w);
                }
            }
            let views: Vec<_> = outputs.iter().map(|w| w.view()).collect();
            let w = stack(Axis(1), &views).unwrap();
            for node in layers[1].iter_mut() {
                if let Some(gp) = node.as_gp_mut() {
                    let x = w.select(Axis(1), gp.input_dim());
                    let z = gp.zt().cloned();
                    let y = gp.yt().clone();
                    gp.update_latent(&x, z.as_ref(), &y)?;
                }
            }
            Ok(())
        }
    }

    fn test_points(n: usize) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        Array::random_using((n, 2), Uniform::new(0., 1.), &mut rng)
    }

    fn jitter_emulator(with_likelihood: bool) -> Emulator {
        let mut imputer = JitterImputer {
            rng: Xoshiro256Plus::seed_from_u64(1),
            scale: 0.05,
        };
        Emulator::new_with_burnin(two_layers_network(with_likelihood), &mut imputer, 6, 3)
            .unwrap()
            .with_rng(Xoshiro256Plus::seed_from_u64(42))
    }

    #[test]
    fn test_snapshots_share_params() {
        let emulator = jitter_emulator(false);
        assert_eq!(emulator.n_imputations(), 6);
        let nodes: Vec<&GpNode> = emulator
            .snapshots()
            .iter()
            .map(|n| n.layers()[0][0].as_gp().unwrap())
            .collect();
        assert!(nodes.windows(2).all(|w| w[0].shares_params(w[1])));
        assert_ne!(nodes[0].yt(), nodes[1].yt());
    }

    #[test]
    fn test_empty_emulator() {
        assert!(Emulator::from_snapshots(vec![]).is_err());
    }

    #[test]
    fn test_snapshots_structure_checked() {
        let with_lik = two_layers_network(true);
        let res = Emulator::from_snapshots(vec![with_lik.clone(), two_layers_network(false)]);
        assert!(res.is_err());

        // same widths, output node of another kind
        let mut other = with_lik.clone();
        let gp = other.layers()[1][0].clone();
        other.layers_mut()[1][1] = gp;
        let res = Emulator::from_snapshots(vec![with_lik.clone(), other]);
        assert!(matches!(res, Err(DgpError::InvalidValueError(_))));

        // same kinds, likelihood fed by another hidden node
        let mut other = with_lik.clone();
        other.layers_mut()[1][1] = Node::Likelihood(
            LikelihoodNode::new(Likelihood::Gaussian { noise: 0.01 }, vec![0]).unwrap(),
        );
        assert!(Emulator::from_snapshots(vec![with_lik.clone(), other]).is_err());

        assert!(Emulator::from_snapshots(vec![with_lik.clone(), with_lik]).is_ok());
    }

    #[test]
    fn test_concurrent_predictions() {
        let emulator = jitter_emulator(true);
        let x = test_points(4);
        let expected = emulator.predict(&x, Method::MeanVar, false, 0).unwrap();
        let results = (0..32)
            .into_par_iter()
            .map(|_| emulator.predict(&x, Method::MeanVar, false, 0))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert!(results.iter().all(|p| *p == expected));

        let samples = (0..32)
            .into_par_iter()
            .map(|_| emulator.predict(&x, Method::Sampling, false, 3))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        for p in samples {
            match p {
                Prediction::Samples(s) => assert!(s.iter().all(|s| s.dim() == (4, 6 * 3))),
                _ => panic!("unexpected prediction"),
            }
        }
    }

    #[test]
    fn test_successive_samplings_differ() {
        let emulator = jitter_emulator(true);
        let x = test_points(2);
        let s1 = emulator.predict(&x, Method::Sampling, false, 5).unwrap();
        let s2 = emulator.predict(&x, Method::Sampling, false, 5).unwrap();
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_mean_var_law_of_total_variance() {
        let emulator = jitter_emulator(true);
        let x = test_points(5);
        let (mean, var) = match emulator.predict(&x, Method::MeanVar, false, 0).unwrap() {
            Prediction::MeanVar { mean, var } => (mean, var),
            _ => panic!("unexpected prediction"),
        };
        let moments: Vec<LayerMoments> = emulator
            .snapshots()
            .iter()
            .map(|n| n.propagate(&x, false).unwrap().remove(0))
            .collect();
        let n = moments.len() as f64;
        let mean_of_means = moments.iter().fold(Array2::zeros((5, 2)), |acc, m| acc + &m.mean) / n;
        let var_of_means = moments.iter().fold(Array2::zeros((5, 2)), |acc, m| {
            acc + (&m.mean - &mean_of_means).mapv(|d| d * d)
        }) / n;
        let mean_of_vars = moments.iter().fold(Array2::<f64>::zeros((5, 2)), |acc, m| acc + &m.var) / n;
        assert_abs_diff_eq!(mean, mean_of_means, epsilon = 1e-12);
        assert_abs_diff_eq!(var, &var_of_means + &mean_of_vars, epsilon = 1e-10);
        assert!(var_of_means.sum() > 0.);
    }

    #[test]
    fn test_full_layer_mean_var() {
        let emulator = jitter_emulator(true);
        let x = test_points(4);
        match emulator.predict(&x, Method::MeanVar, true, 0).unwrap() {
            Prediction::LayerMeanVar { mean, var } => {
                assert_eq!(mean.len(), 2);
                assert_eq!(var.len(), 2);
                assert_eq!(mean[0].dim(), (4, 2));
            }
            _ => panic!("unexpected prediction"),
        }
    }

    #[test]
    fn test_sampling_converges_to_mean_var() {
        let emulator = jitter_emulator(true);
        let x = test_points(3);
        let (mean, var) = match emulator.predict(&x, Method::MeanVar, false, 0).unwrap() {
            Prediction::MeanVar { mean, var } => (mean, var),
            _ => panic!("unexpected prediction"),
        };
        let samples = match emulator.predict(&x, Method::Sampling, false, 2000).unwrap() {
            Prediction::Samples(samples) => samples,
            _ => panic!("unexpected prediction"),
        };
        assert_eq!(samples.len(), 2);
        for (j, s) in samples.iter().enumerate() {
            assert_eq!(s.dim(), (3, 6 * 2000));
            let sample_mean = s.mean_axis(Axis(1)).unwrap();
            let sample_var = s.var_axis(Axis(1), 0.);
            Zip::from(&sample_mean)
                .and(&mean.column(j))
                .and(&var.column(j))
                .for_each(|sm, m, v| assert!((sm - m).abs() < 0.05 * v.sqrt()));
            Zip::from(&sample_var)
                .and(&var.column(j))
                .for_each(|sv, v| assert!((sv - v).abs() < 0.05 * v));
        }
    }

    #[test]
    fn test_full_layer_sampling() {
        let emulator = jitter_emulator(true);
        let x = test_points(3);
        match emulator
            .predict(&x, Method::Sampling, true, DEFAULT_SAMPLE_SIZE)
            .unwrap()
        {
            Prediction::LayerSamples(layers) => {
                assert_eq!(layers.len(), 2);
                assert!(layers
                    .iter()
                    .flatten()
                    .all(|s| s.dim() == (3, 6 * DEFAULT_SAMPLE_SIZE)));
            }
            _ => panic!("unexpected prediction"),
        }
        assert!(emulator.predict(&x, Method::Sampling, true, 0).is_err());
    }

    #[test]
    fn test_identity_likelihood_mean() {
        // GP node followed by a noiseless gaussian likelihood: same predictive mean
        let xt = array![[0.], [0.4], [0.7], [1.]];
        let yt = array![0.3, 1.2, -0.4, 0.5];
        let params = GpNode::params(Kernel::Matern52)
            .length(array![0.3])
            .check()
            .unwrap();
        let gp = GpNode::new(params, &xt, None::<&Array2<f64>>, &yt).unwrap();
        let lik = LikelihoodNode::new(Likelihood::Gaussian { noise: 0. }, vec![0]).unwrap();
        let network =
            Network::new(vec![vec![Node::Gp(gp.clone())], vec![Node::Likelihood(lik)]]).unwrap();
        let emulator = Emulator::new(network, &mut StaticImputer, 3).unwrap();

        let x = array![[0.1], [0.55], [0.9]];
        let (gp_mean, gp_var) = gp.gp_prediction(&x, None::<&Array2<f64>>).unwrap();
        match emulator.predict(&x, Method::MeanVar, false, 0).unwrap() {
            Prediction::MeanVar { mean, var } => {
                assert_abs_diff_eq!(mean.column(0), gp_mean, epsilon = 1e-12);
                assert_abs_diff_eq!(var.column(0), gp_var, epsilon = 1e-12);
            }
            _ => panic!("unexpected prediction"),
        }
    }

    #[test]
    fn test_nllik_gaussian_closed_form() {
        let xt = array![[0.], [0.4], [0.7], [1.]];
        let yt = array![0.3, 1.2, -0.4, 0.5];
        let params = GpNode::params(Kernel::SquaredExponential)
            .length(array![0.3])
            .scale(0.1)
            .check()
            .unwrap();
        let gp = GpNode::new(params, &xt, None::<&Array2<f64>>, &yt).unwrap();
        // latent variance small wrt noise for 10 points quadrature to be accurate
        let noise = 1.;
        let lik = LikelihoodNode::new(Likelihood::Gaussian { noise }, vec![0]).unwrap();
        let network =
            Network::new(vec![vec![Node::Gp(gp.clone())], vec![Node::Likelihood(lik)]]).unwrap();
        let emulator = Emulator::new(network, &mut StaticImputer, 2).unwrap();

        let x = array![[0.1], [0.55], [0.9]];
        let y = array![0.5, 0.2, 0.1];
        let (nllik, pointwise) = emulator.nllik(&x, &y).unwrap();

        let (m, v) = gp.gp_prediction(&x, None::<&Array2<f64>>).unwrap();
        let mut expected = Array1::zeros(3);
        Zip::from(&mut expected)
            .and(&m)
            .and(&v)
            .and(&y)
            .for_each(|e, m, v, y| {
                let s2 = v + noise;
                *e = 0.5 * (2. * PI * s2).ln() + 0.5 * (y - m) * (y - m) / s2
            });
        assert_abs_diff_eq!(pointwise, expected, epsilon = 1e-7);
        assert_abs_diff_eq!(nllik, expected.mean().unwrap(), epsilon = 1e-7);
    }

    #[test]
    fn test_nllik_heteroskedastic_matches_dense_grid() {
        let xt = array![[0.], [0.25], [0.5], [0.75], [1.]];
        let f_mean = xt.column(0).mapv(|x| (3_f64 * x).sin());
        let f_logvar = xt.column(0).mapv(|x| -1. + 0.3 * (3_f64 * x).cos());
        let mean_gp = GpNode::new(
            GpNode::params(Kernel::SquaredExponential)
                .length(array![0.3])
                .scale(0.1)
                .check()
                .unwrap(),
            &xt,
            None::<&Array2<f64>>,
            &f_mean,
        )
        .unwrap();
        let logvar_gp = GpNode::new(
            GpNode::params(Kernel::Matern52)
                .length(array![0.4])
                .scale(0.1)
                .check()
                .unwrap(),
            &xt,
            None::<&Array2<f64>>,
            &f_logvar,
        )
        .unwrap();
        let lik = LikelihoodNode::new(Likelihood::Heteroskedastic, vec![0, 1]).unwrap();
        let network = Network::new(vec![
            vec![Node::Gp(mean_gp.clone()), Node::Gp(logvar_gp.clone())],
            vec![Node::Likelihood(lik)],
        ])
        .unwrap();
        let emulator = Emulator::new(network, &mut StaticImputer, 2).unwrap();

        let x = array![[0.1], [0.6], [1.3]];
        let y = array![0.4, 0.9, -0.2];
        let (nllik, pointwise) = emulator.nllik(&x, &y).unwrap();

        // trapezoid rule over +/- 8 standard deviations in both latent dimensions
        let (m0, v0) = mean_gp.gp_prediction(&x, None::<&Array2<f64>>).unwrap();
        let (m1, v1) = logvar_gp.gp_prediction(&x, None::<&Array2<f64>>).unwrap();
        let n_grid = 401;
        let step = 16. / (n_grid - 1) as f64;
        let t = Array1::from_shape_fn(n_grid, |k| -8. + k as f64 * step);
        let w = Array1::from_shape_fn(n_grid, |k| {
            let end = if k == 0 || k == n_grid - 1 { 0.5 } else { 1. };
            end * step * (-0.5 * t[k] * t[k]).exp() / (2. * PI).sqrt()
        });
        let expected = Array1::from_shape_fn(3, |i| {
            let (s0, s1) = (v0[i].sqrt(), v1[i].sqrt());
            let grid = Array2::from_shape_fn((n_grid * n_grid, 2), |(k, d)| match d {
                0 => m0[i] + s0 * t[k / n_grid],
                _ => m1[i] + s1 * t[k % n_grid],
            });
            let dens = Likelihood::Heteroskedastic
                .log_density(y[i], &grid)
                .mapv(f64::exp);
            let lik = dens
                .indexed_iter()
                .map(|(k, d)| w[k / n_grid] * w[k % n_grid] * d)
                .sum::<f64>();
            -lik.ln()
        });
        assert!(v1[2] > 1e-2);
        assert_abs_diff_eq!(pointwise, expected, epsilon = 1e-4);
        assert_abs_diff_eq!(nllik, expected.mean().unwrap(), epsilon = 1e-4);
    }

    #[test]
    fn test_nllik_requires_single_likelihood() {
        let emulator = jitter_emulator(true);
        let x = test_points(3);
        let res = emulator.nllik(&x, &array![0., 1., 2.]);
        assert!(matches!(res, Err(DgpError::NllikError(_))));

        let emulator = jitter_emulator(false);
        let res = emulator.nllik(&x, &array![0., 1., 2.]);
        assert!(matches!(res, Err(DgpError::NllikError(_))));
    }

    #[test]
    fn test_ppredict_mean_var_matches_predict() {
        let emulator = jitter_emulator(true);
        let x = test_points(11);
        let expected = emulator.predict(&x, Method::MeanVar, true, 0).unwrap();
        let actual = emulator
            .ppredict(&x, Method::MeanVar, true, 0, Some(3), Some(2))
            .unwrap();
        match (expected, actual) {
            (
                Prediction::LayerMeanVar { mean: m1, var: v1 },
                Prediction::LayerMeanVar { mean: m2, var: v2 },
            ) => {
                for l in 0..2 {
                    assert_abs_diff_eq!(m1[l], m2[l], epsilon = 1e-12);
                    assert_abs_diff_eq!(v1[l], v2[l], epsilon = 1e-12);
                }
            }
            _ => panic!("unexpected prediction"),
        }
    }

    #[test]
    fn test_ppredict_sampling_shapes() {
        let emulator = jitter_emulator(true);
        let x = test_points(7);
        match emulator
            .ppredict(&x, Method::Sampling, false, 10, Some(3), None)
            .unwrap()
        {
            Prediction::Samples(samples) => {
                assert_eq!(samples.len(), 2);
                assert!(samples.iter().all(|s| s.dim() == (7, 60)));
            }
            _ => panic!("unexpected prediction"),
        }
        // any failing chunk fails the whole prediction
        assert!(emulator
            .ppredict(&array![[0.5]], Method::MeanVar, false, 0, None, None)
            .is_err());
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let x = test_points(2);
        let s1 = jitter_emulator(true)
            .predict(&x, Method::Sampling, false, 5)
            .unwrap();
        let s2 = jitter_emulator(true)
            .predict(&x, Method::Sampling, false, 5)
            .unwrap();
        assert_eq!(s1, s2);
    }

    #[cfg(feature = "persistent")]
    #[test]
    fn test_save_load() {
        let emulator = jitter_emulator(true);
        let x = test_points(4);
        let expected = emulator.predict(&x, Method::MeanVar, false, 0).unwrap();
        for (format, file) in [
            (GpFileFormat::Json, "target/tests/emulator.json"),
            (GpFileFormat::Binary, "target/tests/emulator.bin"),
        ] {
            std::fs::create_dir_all("target/tests").ok();
            emulator.save(file, format).expect("Emulator saving");
            let loaded = Emulator::load(file, format).expect("Emulator loading");
            assert_eq!(loaded.n_imputations(), 6);
            let actual = loaded.predict(&x, Method::MeanVar, false, 0).unwrap();
            match (&expected, actual) {
                (
                    Prediction::MeanVar { mean: m1, var: v1 },
                    Prediction::MeanVar { mean: m2, var: v2 },
                ) => {
                    assert_abs_diff_eq!(*m1, m2, epsilon = 1e-10);
                    assert_abs_diff_eq!(*v1, v2, epsilon = 1e-10);
                }
                _ => panic!("unexpected prediction"),
            }
        }
    }
}
