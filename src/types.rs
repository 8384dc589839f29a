use ndarray::Array2;

/// Prediction method of an emulator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    /// Predictive means and variances
    #[default]
    MeanVar,
    /// Predictive samples
    Sampling,
}

/// Predictions of an emulator
#[derive(Clone, Debug, PartialEq)]
pub enum Prediction {
    /// Output layer means and variances, (n_points, n_outputs) arrays
    MeanVar {
        /// Predictive means
        mean: Array2<f64>,
        /// Predictive variances
        var: Array2<f64>,
    },
    /// Means and variances of every layer
    LayerMeanVar {
        /// Predictive means per layer
        mean: Vec<Array2<f64>>,
        /// Predictive variances per layer
        var: Vec<Array2<f64>>,
    },
    /// One (n_points, n_imputations * sample_size) array per output node,
    /// columns of a given imputation are contiguous
    Samples(Vec<Array2<f64>>),
    /// Samples of every node of every layer
    LayerSamples(Vec<Vec<Array2<f64>>>),
}

#[derive(Clone, Copy, Default, Debug)]
/// An enumeration of available file formats
pub enum GpFileFormat {
    /// Human readable format
    #[default]
    Json,
    /// Binary format
    Binary,
}
