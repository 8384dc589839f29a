//! Likelihood nodes mapping latent gaussian outputs of the previous layer to observations.
//!
//! The following likelihoods are implemented:
//! * gaussian with fixed noise variance,
//! * poisson with log link,
//! * heteroskedastic gaussian where the second latent input is the log of the noise variance.

use crate::errors::{DgpError, Result};
use ndarray::{Array1, ArrayBase, ArrayView1, Axis, Data, Ix2, Zip};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::{Distribution, Normal, Poisson};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Response family of a likelihood node
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Likelihood {
    /// Gaussian observation noise of given variance, identity pass-through when `noise` is 0
    Gaussian {
        /// Noise variance
        noise: f64,
    },
    /// Poisson counts with log link
    Poisson,
    /// Gaussian observation with latent mean and latent log-variance
    Heteroskedastic,
}

impl Likelihood {
    /// Number of latent inputs consumed by the likelihood
    pub fn n_latent(&self) -> usize {
        match self {
            Likelihood::Gaussian { .. } | Likelihood::Poisson => 1,
            Likelihood::Heteroskedastic => 2,
        }
    }

    /// Predictive mean and variance of observations given independent gaussian
    /// latent inputs of means `m` (n, n_latent) and variances `v` (n, n_latent)
    pub fn prediction(
        &self,
        m: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        v: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        self.check_latent(m.ncols())?;
        let mut mean = Array1::zeros(m.nrows());
        let mut var = Array1::zeros(m.nrows());
        Zip::from(&mut mean)
            .and(&mut var)
            .and(m.rows())
            .and(v.rows())
            .for_each(|mu, sigma2, m_i, v_i| match self {
                Likelihood::Gaussian { noise } => {
                    *mu = m_i[0];
                    *sigma2 = v_i[0] + noise;
                }
                Likelihood::Poisson => {
                    *mu = (m_i[0] + 0.5 * v_i[0]).exp();
                    *sigma2 = *mu + v_i[0].exp_m1() * (2. * m_i[0] + v_i[0]).exp();
                }
                Likelihood::Heteroskedastic => {
                    *mu = m_i[0];
                    *sigma2 = v_i[0] + (m_i[1] + 0.5 * v_i[1]).exp();
                }
            });
        Ok((mean, var))
    }

    /// Draw one observation per row of latent realizations `f` (n, n_latent)
    pub fn sampling<R: Rng>(
        &self,
        f: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        rng: &mut R,
    ) -> Result<Array1<f64>> {
        self.check_latent(f.ncols())?;
        f.outer_iter()
            .map(|f_i| match self {
                Likelihood::Gaussian { noise } => Normal::new(f_i[0], noise.sqrt())
                    .map(|d| d.sample(rng))
                    .map_err(|e| DgpError::SampleError(e.to_string())),
                // rate underflows to 0 for very negative latent values
                Likelihood::Poisson => Poisson::new(f_i[0].exp().max(f64::MIN_POSITIVE))
                    .map(|d| d.sample(rng))
                    .map_err(|e| DgpError::SampleError(e.to_string())),
                Likelihood::Heteroskedastic => Normal::new(f_i[0], (0.5 * f_i[1]).exp())
                    .map(|d| d.sample(rng))
                    .map_err(|e| DgpError::SampleError(e.to_string())),
            })
            .collect()
    }

    /// Log-density of observation `y` for each row of latent values `f` (n, n_latent)
    pub fn log_density(&self, y: f64, f: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array1<f64> {
        f.map_axis(Axis(1), |f_i| self.log_density_at(y, f_i))
    }

    fn log_density_at(&self, y: f64, f: ArrayView1<f64>) -> f64 {
        match self {
            Likelihood::Gaussian { noise } => {
                -0.5 * (2. * PI * noise).ln() - 0.5 * (y - f[0]) * (y - f[0]) / noise
            }
            Likelihood::Poisson => y * f[0] - f[0].exp() - libm::lgamma(y + 1.),
            Likelihood::Heteroskedastic => {
                -0.5 * (2. * PI).ln() - 0.5 * f[1] - 0.5 * (y - f[0]) * (y - f[0]) / f[1].exp()
            }
        }
    }

    fn check_latent(&self, n: usize) -> Result<()> {
        if n != self.n_latent() {
            return Err(DgpError::InvalidValueError(format!(
                "{} likelihood expects {} latent inputs, got {}",
                self,
                self.n_latent(),
                n
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Likelihood::Gaussian { noise } => write!(f, "Gaussian(noise={})", noise),
            Likelihood::Poisson => write!(f, "Poisson"),
            Likelihood::Heteroskedastic => write!(f, "Heteroskedastic"),
        }
    }
}

/// A likelihood node of the last layer of a deep gaussian process
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LikelihoodNode {
    likelihood: Likelihood,
    /// Columns of the previous layer output feeding the likelihood
    input_dim: Vec<usize>,
}

impl LikelihoodNode {
    /// Constructor of a likelihood node fed by `input_dim` columns of the previous layer
    pub fn new(likelihood: Likelihood, input_dim: Vec<usize>) -> Result<LikelihoodNode> {
        likelihood.check_latent(input_dim.len())?;
        if let Likelihood::Gaussian { noise } = likelihood {
            if !(noise >= 0.) {
                return Err(DgpError::InvalidValueError(format!(
                    "Gaussian likelihood noise should be non negative, got {}",
                    noise
                )));
            }
        }
        if input_dim.len() == 2 && input_dim[0] == input_dim[1] {
            return Err(DgpError::InvalidValueError(format!(
                "Likelihood `input_dim` has duplicated indices {:?}",
                input_dim
            )));
        }
        Ok(LikelihoodNode {
            likelihood,
            input_dim,
        })
    }

    /// Response family
    pub fn likelihood(&self) -> &Likelihood {
        &self.likelihood
    }

    /// Columns of the previous layer output feeding the likelihood
    pub fn input_dim(&self) -> &[usize] {
        &self.input_dim
    }

    /// See [`Likelihood::prediction`]
    pub fn prediction(
        &self,
        m: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        v: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        self.likelihood.prediction(m, v)
    }

    /// See [`Likelihood::sampling`]
    pub fn sampling<R: Rng>(
        &self,
        f: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        rng: &mut R,
    ) -> Result<Array1<f64>> {
        self.likelihood.sampling(f, rng)
    }

    /// Log-likelihood of observation `y` at each point of the latent grid `f` (n_grid, n_latent)
    pub fn pointwise_log_likelihood(
        &self,
        y: f64,
        f: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Array1<f64> {
        self.likelihood.log_density(y, f)
    }
}

impl fmt::Display for LikelihoodNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(input_dim={:?})", self.likelihood, self.input_dim)
    }
}
