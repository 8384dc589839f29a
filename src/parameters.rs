use crate::correlation_models::Kernel;
use crate::errors::{DgpError, Result};
use linfa::ParamGuard;
use ndarray::{array, Array1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Default nugget of GP nodes
pub const DEFAULT_NUGGET: f64 = 1e-6;
/// Default number of imputed network snapshots used by an emulator
pub const DEFAULT_N_IMPUTATIONS: usize = 50;
/// Default number of imputation steps discarded before the first snapshot
pub const DEFAULT_BURNIN: usize = 50;
/// Default number of samples drawn per snapshot in sampling mode
pub const DEFAULT_SAMPLE_SIZE: usize = 50;
/// Default maximum number of test rows per chunk in parallel prediction
pub const DEFAULT_CHUNK_SIZE: usize = 200;
/// Number of Gauss-Hermite points per latent dimension
pub const GH_N_POINTS: usize = 10;

/// A set of validated GP node parameters.
///
/// Once fitted, the parameters are shared by every imputed snapshot of a node.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GpNodeValidParams {
    /// Kernel family
    pub(crate) kernel: Kernel,
    /// Length scales, one per input dimension (latent inputs then connected inputs)
    /// or a single value broadcast to all dimensions
    pub(crate) length: Array1<f64>,
    /// Variance of the gaussian process
    pub(crate) scale: f64,
    /// Parameter to improve numerical stability
    pub(crate) nugget: f64,
    /// Whether the node has a zero prior mean or a constant mean with gaussian prior
    pub(crate) zero_mean: bool,
    /// Prior variance of the constant mean coefficient
    pub(crate) mean_prior: f64,
    /// Columns of the previous layer output (or of the global input in the first layer)
    pub(crate) input_dim: Option<Vec<usize>>,
    /// Columns of the global input the node is connected to
    pub(crate) connect: Option<Vec<usize>>,
}

impl Default for GpNodeValidParams {
    fn default() -> GpNodeValidParams {
        GpNodeValidParams {
            kernel: Kernel::default(),
            length: array![1.0],
            scale: 1.0,
            nugget: DEFAULT_NUGGET,
            zero_mean: true,
            mean_prior: 1.0,
            input_dim: None,
            connect: None,
        }
    }
}

impl GpNodeValidParams {
    /// Get kernel family
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Get length scales
    pub fn length(&self) -> &Array1<f64> {
        &self.length
    }

    /// Get gaussian process variance
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Get nugget
    pub fn nugget(&self) -> f64 {
        self.nugget
    }

    /// Whether the prior mean is zero
    pub fn zero_mean(&self) -> bool {
        self.zero_mean
    }

    /// Get prior variance of the mean coefficient
    pub fn mean_prior(&self) -> f64 {
        self.mean_prior
    }

    /// Get input columns, `None` meaning all training columns
    pub fn input_dim(&self) -> Option<&[usize]> {
        self.input_dim.as_deref()
    }

    /// Get global input columns the node is connected to
    pub fn connect(&self) -> Option<&[usize]> {
        self.connect.as_deref()
    }
}

#[derive(Clone, Debug, Default)]
/// The set of hyperparameters that can be specified for a [GP node](crate::GpNode).
///
/// Hyperparameters are given, not estimated: fitting only computes the
/// statistics required by predictions.
pub struct GpNodeParams(GpNodeValidParams);

impl GpNodeParams {
    /// A constructor for GP node parameters given a kernel family
    pub fn new(kernel: Kernel) -> GpNodeParams {
        Self(GpNodeValidParams {
            kernel,
            ..Default::default()
        })
    }

    /// A constructor for GP node parameters from validated parameters
    pub fn new_from_valid(params: &GpNodeValidParams) -> Self {
        Self(params.clone())
    }

    /// Set kernel family.
    pub fn kernel(mut self, kernel: Kernel) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set length scales.
    ///
    /// Either one value per input dimension, latent inputs first then connected
    /// global inputs, or a single value shared by all dimensions.
    pub fn length(mut self, length: Array1<f64>) -> Self {
        self.0.length = length;
        self
    }

    /// Set gaussian process variance.
    pub fn scale(mut self, scale: f64) -> Self {
        self.0.scale = scale;
        self
    }

    /// Set nugget.
    ///
    /// Nugget is added to the correlation matrix diagonal
    pub fn nugget(mut self, nugget: f64) -> Self {
        self.0.nugget = nugget;
        self
    }

    /// Set zero mean (default) or constant mean with gaussian prior
    pub fn zero_mean(mut self, zero_mean: bool) -> Self {
        self.0.zero_mean = zero_mean;
        self
    }

    /// Set prior variance of the constant mean coefficient.
    ///
    /// Only used when the node has not a zero mean
    pub fn mean_prior(mut self, mean_prior: f64) -> Self {
        self.0.mean_prior = mean_prior;
        self
    }

    /// Set the columns of the previous layer output used as inputs.
    pub fn input_dim(mut self, input_dim: Vec<usize>) -> Self {
        self.0.input_dim = Some(input_dim);
        self
    }

    /// Set the columns of the global input the node is connected to.
    pub fn connect(mut self, connect: Vec<usize>) -> Self {
        self.0.connect = Some(connect);
        self
    }
}

impl From<GpNodeValidParams> for GpNodeParams {
    fn from(valid: GpNodeValidParams) -> Self {
        GpNodeParams(valid)
    }
}

/// Check indices are not empty and have no duplicates
fn check_indices(name: &str, indices: &[usize]) -> Result<()> {
    if indices.is_empty() {
        return Err(DgpError::InvalidValueError(format!(
            "`{}` should not be empty",
            name
        )));
    }
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(DgpError::InvalidValueError(format!(
            "`{}` has duplicated indices {:?}",
            name, indices
        )));
    }
    Ok(())
}

impl ParamGuard for GpNodeParams {
    type Checked = GpNodeValidParams;
    type Error = DgpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let p = &self.0;
        if p.length.is_empty() || p.length.iter().any(|l| !(*l > 0.)) {
            return Err(DgpError::InvalidValueError(format!(
                "`length` should be non empty with positive values, got {}",
                p.length
            )));
        }
        if !(p.scale > 0.) {
            return Err(DgpError::InvalidValueError(format!(
                "`scale` should be positive, got {}",
                p.scale
            )));
        }
        if !(p.nugget >= 0.) {
            return Err(DgpError::InvalidValueError(format!(
                "`nugget` should be non negative, got {}",
                p.nugget
            )));
        }
        if !p.zero_mean && !(p.mean_prior > 0.) {
            return Err(DgpError::InvalidValueError(format!(
                "`mean_prior` should be positive, got {}",
                p.mean_prior
            )));
        }
        if let Some(input_dim) = p.input_dim() {
            check_indices("input_dim", input_dim)?;
        }
        if let Some(connect) = p.connect() {
            check_indices("connect", connect)?;
            if let Some(input_dim) = p.input_dim() {
                if let Some(i) = connect.iter().find(|c| input_dim.contains(c)) {
                    return Err(DgpError::InvalidValueError(format!(
                        "`input_dim` and `connect` should be disjoint, both contain {}",
                        i
                    )));
                }
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
