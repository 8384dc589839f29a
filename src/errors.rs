use thiserror::Error;

/// A result type for DGP emulation
pub type Result<T> = std::result::Result<T, DgpError>;

/// An error when building or predicting with a [`Network`](crate::Network),
/// an [`Emulator`](crate::Emulator) or a [`Gp`](crate::Gp)
#[derive(Error, Debug)]
pub enum DgpError {
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When a node or network configuration is not valid
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When predictive log-likelihood is requested on an unsupported network
    #[error("Nllik error: {0}")]
    NllikError(String),
    /// When sampling fails
    #[error("Sample error: {0}")]
    SampleError(String),
    /// When the worker pool cannot be set up
    #[error("Worker error: {0}")]
    WorkerError(String),
    /// When error during saving
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveJsonError(#[from] serde_json::Error),
    /// When error during binary saving or loading
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveBinaryError(#[from] bincode::Error),
    /// When error during loading
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
}
