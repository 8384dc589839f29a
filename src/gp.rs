use crate::errors::{DgpError, Result};
use crate::gp_node::GpNode;
use crate::network::select_columns;
use crate::parameters::DEFAULT_SAMPLE_SIZE;
use crate::types::{Method, Prediction};
use crate::utils::{
    concat_predictions, default_chunk_num, default_rng, dispatch_chunks, draw_normal,
    jump_streams, RngRef,
};

use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use ndarray_rand::rand::Rng;
use rand_xoshiro::Xoshiro256Plus;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

#[cfg(feature = "persistent")]
use crate::types::GpFileFormat;
#[cfg(feature = "persistent")]
use std::fs;
#[cfg(feature = "persistent")]
use std::io::Write;

/// A plain gaussian process emulator made of a single GP node taking the
/// `input_dim` columns of the global input, and its `connect` columns when specified.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Gp {
    node: GpNode,
    /// Random generator used in sampling mode
    #[cfg_attr(feature = "serializable", serde(skip, default = "default_rng"))]
    rng: RngRef,
}

impl Gp {
    /// Build a GP emulator from a trained GP node
    pub fn new(node: GpNode) -> Result<Gp> {
        if let Some(connect) = node.connect() {
            if connect.iter().any(|c| node.input_dim().contains(c)) {
                return Err(DgpError::InvalidValueError(
                    "`input_dim` and `connect` of a plain GP should not overlap".to_string(),
                ));
            }
        }
        Ok(Gp {
            node,
            rng: default_rng(),
        })
    }

    /// Set random generator used in sampling mode
    pub fn with_rng(mut self, rng: Xoshiro256Plus) -> Self {
        self.rng = Arc::new(RwLock::new(rng));
        self
    }

    /// The underlying GP node
    pub fn node(&self) -> &GpNode {
        &self.node
    }

    /// Predictive means and variances at test points `x` (n, nx)
    pub fn moments(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let x = x.view();
        let xs = select_columns(&x, self.node.input_dim())?;
        let z = self
            .node
            .connect()
            .map(|connect| select_columns(&x, connect))
            .transpose()?;
        self.node.gp_prediction(&xs, z.as_ref())
    }

    /// Predict at test points `x` (n, nx).
    ///
    /// With [`Method::MeanVar`], returns (n, 1) means and variances. With [`Method::Sampling`],
    /// returns a single (n, `sample_size`) array of draws from the predictive gaussians.
    pub fn predict(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        method: Method,
        sample_size: usize,
    ) -> Result<Prediction> {
        let x = x.view();
        match method {
            Method::MeanVar => self.mean_var(&x),
            Method::Sampling => {
                let mut rng = jump_streams(&self.rng, 1)?.pop().ok_or_else(|| {
                    DgpError::SampleError("No random stream available".to_string())
                })?;
                self.sampling(&x, sample_size, &mut rng)
            }
        }
    }

    /// Sampling prediction with [`DEFAULT_SAMPLE_SIZE`] samples
    pub fn sample(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        match self.predict(x, Method::Sampling, DEFAULT_SAMPLE_SIZE)? {
            Prediction::Samples(mut samples) if samples.len() == 1 => Ok(samples.remove(0)),
            _ => Err(DgpError::SampleError("Unexpected GP samples".to_string())),
        }
    }

    /// Parallel version of [`Gp::predict`].
    ///
    /// Test points are split in `chunk_num` chunks (default to chunks of at most
    /// [`DEFAULT_CHUNK_SIZE`](crate::DEFAULT_CHUNK_SIZE) points) processed by at most
    /// `core_num` workers (default to available cores minus one).
    pub fn ppredict(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        method: Method,
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
                Some(rng) => self.sampling(&x, sample_size, &mut rng.clone()),
                None => self.mean_var(&x),
            }
        })?;
        concat_predictions(parts)
    }

    fn mean_var(&self, x: &ArrayView2<f64>) -> Result<Prediction> {
        let (mean, var) = self.moments(x)?;
        Ok(Prediction::MeanVar {
            mean: mean.insert_axis(Axis(1)),
            var: var.insert_axis(Axis(1)),
        })
    }

    fn sampling<R: Rng>(
        &self,
        x: &ArrayView2<f64>,
        sample_size: usize,
        rng: &mut R,
    ) -> Result<Prediction> {
        if sample_size == 0 {
            return Err(DgpError::InvalidValueError(
                "`sample_size` should be positive".to_string(),
            ));
        }
        let (mean, var) = self.moments(x)?;
        Ok(Prediction::Samples(vec![draw_normal(
            &mean.view(),
            &var.view(),
            sample_size,
            rng,
        )]))
    }
}

impl fmt::Display for Gp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.node)
    }
}

#[cfg(feature = "persistent")]
impl Gp {
    /// Save GP emulator in given file.
    pub fn save(&self, path: &str, format: GpFileFormat) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = match format {
            GpFileFormat::Json => serde_json::to_vec(self)?,
            GpFileFormat::Binary => bincode::serialize(self)?,
        };
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Load GP emulator from given file.
    pub fn load(path: &str, format: GpFileFormat) -> Result<Box<Gp>> {
        let data = fs::read(path)?;
        let gp = match format {
            GpFileFormat::Json => serde_json::from_slice(&data)?,
            GpFileFormat::Binary => bincode::deserialize(&data)?,
        };
        Ok(Box::new(gp))
    }
}
