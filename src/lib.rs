//! This library implements predictions of [Deep Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! emulators (DGP), that is feed-forward networks of gaussian process nodes where the outputs
//! of a layer are the inputs of the next one, possibly ended by likelihood nodes.
//!
//! Predictive means and variances are propagated analytically through the layers using closed
//! form expectations of the linked GP (see [`GpNode::linkgp_prediction`]) for squared exponential
//! and Matérn 5/2 kernels, hence no Monte Carlo is required in [`Method::MeanVar`] mode.
//! Predictions are averaged over imputed snapshots of the trained network
//! with the law of total variance.
//!
//! A network is built layer by layer from [`GpNode`]s parameterized by [`GpNodeParams`] and
//! [`LikelihoodNode`]s, imputations are generated by an [`Imputer`] and the resulting
//! [`Emulator`] gives:
//! * predictive means and variances or samples of the output (or every) layer,
//! * the negative predictive log-likelihood of observations when the output layer
//!   is a likelihood node,
//! * chunked parallel predictions over large sets of test points.
//!
//! A single layer emulator is available as [`Gp`].
//!
//! # Example
//!
//! ```
//! use egobox_dgp::{Emulator, GpNode, Kernel, Method, Network, Node, Prediction, StaticImputer};
//! use linfa::ParamGuard;
//! use ndarray::{array, Array2};
//!
//! let xt = array![[0.], [0.25], [0.5], [0.75], [1.]];
//! // hidden layer latent outputs
//! let w = xt.mapv(|x: f64| (6. * x).sin());
//! let yt = w.column(0).mapv(|v| v * v);
//!
//! let hidden = GpNode::params(Kernel::Matern52).length(array![0.3]).check()?;
//! let hidden = GpNode::new(hidden, &xt, None::<&Array2<f64>>, &w.column(0))?;
//! let output = GpNode::params(Kernel::SquaredExponential).check()?;
//! let output = GpNode::new(output, &w, None::<&Array2<f64>>, &yt)?;
//!
//! let network = Network::new(vec![vec![Node::Gp(hidden)], vec![Node::Gp(output)]])?;
//! let emulator = Emulator::new(network, &mut StaticImputer, 10)?;
//!
//! let x = array![[0.1], [0.6]];
//! if let Prediction::MeanVar { mean, var } = emulator.predict(&x, Method::MeanVar, false, 0)? {
//!     assert_eq!(mean.dim(), (2, 1));
//!     assert_eq!(var.dim(), (2, 1));
//! }
//! # Ok::<(), egobox_dgp::DgpError>(())
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
pub mod correlation_models;
mod emulator;
mod errors;
mod gp;
mod gp_node;
mod likelihoods;
mod network;
mod parameters;
mod quadrature;
mod types;

mod utils;

pub use correlation_models::{CorrelationModel, Kernel};
pub use emulator::*;
pub use errors::*;
pub use gp::*;
pub use gp_node::*;
pub use likelihoods::*;
pub use network::{Layer, LayerMoments, Network, Node};
pub use parameters::*;
pub use quadrature::*;
pub use types::*;
