//! A module for correlation models used by the GP nodes of a deep gaussian process.
//!
//! The following correlation models are implemented:
//! * squared exponential,
//! * matern 5/2.
//!
//! Besides the correlation between deterministic points, each model provides the
//! expectation of the correlation vector (the `I` vector) and of the correlation outer
//! product (the `J` matrix) when the test point follows a gaussian distribution with
//! independent components. Those are the building blocks of linked GP predictions
//! where the input of a node is the uncertain output of the previous layer.
//!
//! All models are separable: multi-dimensional quantities are products over dimensions
//! of the one-dimensional terms.

use libm::{erf, erfc};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::f64::consts::{PI, SQRT_2};
use std::fmt;

const SQRT5: f64 = 2.236_067_977_499_79;

/// A trait for using a correlation model in GP nodes
pub trait CorrelationModel: Clone + Copy + Default + fmt::Display + Sync {
    /// Correlation between scalars `x` and `z` given a `length` scale
    fn corr_1d(&self, x: f64, z: f64, length: f64) -> f64;

    /// Expectation of `corr_1d(x, z)` where `z ~ N(mean, var)`
    fn expected_corr_1d(&self, x: f64, mean: f64, var: f64, length: f64) -> f64;

    /// Expectation of `corr_1d(x1, z) * corr_1d(x2, z)` where `z ~ N(mean, var)`
    fn expected_corr_product_1d(&self, x1: f64, x2: f64, mean: f64, var: f64, length: f64)
        -> f64;

    /// Compute the cross-correlation matrix r(xt, x) of shape (n, m) between
    /// `xt` training points (n, d) and `x` points (m, d) given `length` scales (d,).
    fn value(
        &self,
        xt: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        length: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array2<f64> {
        let mut r = Array2::<f64>::ones((xt.nrows(), x.nrows()));
        Zip::from(r.rows_mut())
            .and(xt.rows())
            .for_each(|mut r_i, xt_i| {
                Zip::from(&mut r_i).and(x.rows()).for_each(|r_ij, x_j| {
                    Zip::from(&xt_i)
                        .and(&x_j)
                        .and(length)
                        .for_each(|a, b, l| *r_ij *= self.corr_1d(*a, *b, *l));
                });
            });
        r
    }

    /// Compute the correlation matrix R of `xt` training points (n, d)
    /// regularized with `nugget` on its diagonal.
    fn correlation_matrix(
        &self,
        xt: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        length: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        nugget: f64,
    ) -> Array2<f64> {
        let mut r = self.value(xt, xt, length);
        r.diag_mut().mapv_inplace(|v| v + nugget);
        r
    }

    /// Compute the `I` vector (n,): expectation of r(xt, z) where the test point `z`
    /// has independent gaussian components of given `mean` (d,) and `var` (d,).
    fn expected_value(
        &self,
        xt: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        mean: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        var: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        length: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        let mut i_vec = Array1::<f64>::ones(xt.nrows());
        Zip::from(&mut i_vec)
            .and(xt.rows())
            .for_each(|i_k, xt_k| {
                Zip::from(&xt_k)
                    .and(mean)
                    .and(var)
                    .and(length)
                    .for_each(|x, m, v, l| *i_k *= self.expected_corr_1d(*x, *m, v.abs(), *l));
            });
        i_vec
    }

    /// Compute the `J` matrix (n, n): expectation of r(xt, z).r(xt, z)^T where the test
    /// point `z` has independent gaussian components of given `mean` (d,) and `var` (d,).
    fn expected_product(
        &self,
        xt: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        mean: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        var: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        length: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array2<f64> {
        let n = xt.nrows();
        let mut j_mat = Array2::<f64>::ones((n, n));
        for k in 0..n {
            for l in 0..=k {
                let mut j_kl = 1.;
                Zip::from(&xt.row(k))
                    .and(&xt.row(l))
                    .and(mean)
                    .and(var)
                    .and(length)
                    .for_each(|x1, x2, m, v, len| {
                        j_kl *= self.expected_corr_product_1d(*x1, *x2, *m, v.abs(), *len)
                    });
                j_mat[[k, l]] = j_kl;
                j_mat[[l, k]] = j_kl;
            }
        }
        j_mat
    }
}

/// Squared exponential correlation model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct SquaredExponentialCorr();

impl From<SquaredExponentialCorr> for String {
    fn from(_item: SquaredExponentialCorr) -> String {
        "SquaredExponential".to_string()
    }
}

impl TryFrom<String> for SquaredExponentialCorr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "SquaredExponential" {
            Ok(Self::default())
        } else {
            Err("Bad string value for SquaredExponentialCorr, should be \'SquaredExponential\'")
        }
    }
}

impl CorrelationModel for SquaredExponentialCorr {
    /// exp( - ((x - z) / l)^2 )
    fn corr_1d(&self, x: f64, z: f64, length: f64) -> f64 {
        let d = (x - z) / length;
        (-d * d).exp()
    }

    fn expected_corr_1d(&self, x: f64, mean: f64, var: f64, length: f64) -> f64 {
        let l2 = length * length;
        let d = x - mean;
        (-d * d / (2. * var + l2)).exp() / (1. + 2. * var / l2).sqrt()
    }

    fn expected_corr_product_1d(
        &self,
        x1: f64,
        x2: f64,
        mean: f64,
        var: f64,
        length: f64,
    ) -> f64 {
        let l2 = length * length;
        let sum = (x1 - mean) + (x2 - mean);
        let diff = x1 - x2;
        (-sum * sum / (2. * l2 + 8. * var) - diff * diff / (2. * l2)).exp()
            / (1. + 4. * var / l2).sqrt()
    }
}

impl fmt::Display for SquaredExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}

/// Matern 5/2 correlation model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct Matern52Corr();

impl From<Matern52Corr> for String {
    fn from(_item: Matern52Corr) -> String {
        "Matern52".to_string()
    }
}

impl TryFrom<String> for Matern52Corr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "Matern52" {
            Ok(Self::default())
        } else {
            Err("Bad string value for Matern52Corr, should be \'Matern52\'")
        }
    }
}

/// Logarithm of the complementary error function, accurate where `erfc` underflows
fn ln_erfc(u: f64) -> f64 {
    if u < 25. {
        erfc(u).ln()
    } else {
        // asymptotic expansion, truncation error below 1e-12 for u >= 25
        let u2 = u * u;
        let series = 1. - 1. / (2. * u2) + 3. / (4. * u2 * u2) - 15. / (8. * u2 * u2 * u2)
            + 105. / (16. * u2 * u2 * u2 * u2);
        -u2 - (u * PI.sqrt()).ln() + series.ln()
    }
}

/// `exp(a) * erfc(u)` without overflow of `exp(a)` when `erfc(u)` vanishes
fn exp_erfc(a: f64, u: f64) -> f64 {
    (a + ln_erfc(u)).exp()
}

impl CorrelationModel for Matern52Corr {
    /// (1 + sqrt(5) * d + 5/3 * d^2) * exp( - sqrt(5) * d ) with d = |x - z| / l
    fn corr_1d(&self, x: f64, z: f64, length: f64) -> f64 {
        let d = (x - z).abs() / length;
        (1. + SQRT5 * d + 5. / 3. * d * d) * (-SQRT5 * d).exp()
    }

    fn expected_corr_1d(&self, x: f64, mean: f64, var: f64, length: f64) -> f64 {
        if var == 0. {
            return self.corr_1d(x, mean, length);
        }
        let l = length;
        let l2 = l * l;
        let dens = (0.5 * var / PI).sqrt() / l;
        let z_x = mean - x;
        let mu_a = z_x - SQRT5 * var / l;
        let mu_b = z_x + SQRT5 * var / l;

        let sd2 = SQRT_2 * var.sqrt();
        // exponential prefactors are merged with tail probabilities and gaussian densities
        let a_a = (5. * var - 2. * SQRT5 * l * z_x) / (2. * l2);
        let a_b = (5. * var + 2. * SQRT5 * l * z_x) / (2. * l2);
        let term_a = (1. + SQRT5 * mu_a / l + 5. * (mu_a * mu_a + var) / (3. * l2))
            * 0.5
            * exp_erfc(a_a, -mu_a / sd2)
            + (SQRT5 + 5. * mu_a / (3. * l)) * dens * (a_a - 0.5 * mu_a * mu_a / var).exp();
        let term_b = (1. - SQRT5 * mu_b / l + 5. * (mu_b * mu_b + var) / (3. * l2))
            * 0.5
            * exp_erfc(a_b, mu_b / sd2)
            + (SQRT5 - 5. * mu_b / (3. * l)) * dens * (a_b - 0.5 * mu_b * mu_b / var).exp();
        term_a + term_b
    }

    fn expected_corr_product_1d(
        &self,
        x1: f64,
        x2: f64,
        mean: f64,
        var: f64,
        length: f64,
    ) -> f64 {
        if var == 0. {
            return self.corr_1d(x1, mean, length) * self.corr_1d(x2, mean, length);
        }
        matern52_product_expectation(x1, x2, mean, var, length)
    }
}

/// Expectation of the product of two 1D matern 5/2 correlations centered on `xa` and `xb`
/// against z ~ N(mean, var), var > 0.
///
/// The real line is split in three parts given the ordering x1 <= x2 of the two centers:
/// z < x1, x1 <= z < x2 and z >= x2, on which the product is a polynomial of degree 4
/// times an exponential. Each part integrates in closed form with gaussian moments.
fn matern52_product_expectation(xa: f64, xb: f64, mean: f64, var: f64, length: f64) -> f64 {
    let (x1, x2) = if xa < xb { (xa, xb) } else { (xb, xa) };
    let l = length;
    let l2 = l * l;
    let l3 = l2 * l;
    let l4 = l2 * l2;
    let c = 9. * l4;
    let sd2 = (2. * var).sqrt();
    let dens = (0.5 * var / PI).sqrt();
    let (m, v) = (mean, var);

    // z >= x2
    let e30 = 1.
        + (25. * x1 * x1 * x2 * x2 - 3. * SQRT5 * (3. * l3 + 5. * l * x1 * x2) * (x1 + x2)
            + 15. * l2 * (x1 * x1 + x2 * x2 + 3. * x1 * x2))
            / c;
    let e31 = (18. * SQRT5 * l3 + 15. * SQRT5 * l * (x1 * x1 + x2 * x2)
        - (75. * l2 + 50. * x1 * x2) * (x1 + x2)
        + 60. * SQRT5 * l * x1 * x2)
        / c;
    let e32 = 5.
        * (5. * x1 * x1 + 5. * x2 * x2 + 15. * l2 - 9. * SQRT5 * l * (x1 + x2) + 20. * x1 * x2)
        / c;
    let e33 = 10. * (3. * SQRT5 * l - 5. * x1 - 5. * x2) / c;
    let e34 = 25. / c;
    let mu_c = m - 2. * SQRT5 * v / l;
    let e3a31 = e30
        + mu_c * e31
        + (mu_c * mu_c + v) * e32
        + (mu_c.powi(3) + 3. * v * mu_c) * e33
        + (mu_c.powi(4) + 6. * v * mu_c * mu_c + 3. * v * v) * e34;
    let e3a32 = e31
        + (mu_c + x2) * e32
        + (mu_c * mu_c + 2. * v + x2 * x2 + mu_c * x2) * e33
        + (mu_c.powi(3) + x2.powi(3) + x2 * mu_c * mu_c + mu_c * x2 * x2 + 3. * v * x2
            + 5. * v * mu_c)
            * e34;
    let a1 = (10. * v + SQRT5 * l * (x1 + x2 - 2. * m)) / l2;
    let p1 = 0.5 * e3a31 * exp_erfc(a1, (x2 - mu_c) / sd2)
        + e3a32 * dens * (a1 - 0.5 * (x2 - mu_c) * (x2 - mu_c) / v).exp();

    // x1 <= z < x2
    let e40 = 1.
        + (25. * x1 * x1 * x2 * x2 + 3. * SQRT5 * (3. * l3 - 5. * l * x1 * x2) * (x2 - x1)
            + 15. * l2 * (x1 * x1 + x2 * x2 - 3. * x1 * x2))
            / c;
    let e41 = 5.
        * (3. * SQRT5 * l * (x2 * x2 - x1 * x1) + 3. * l2 * (x1 + x2)
            - 10. * x1 * x2 * (x1 + x2))
        / c;
    let e42 = 5.
        * (5. * x1 * x1 + 5. * x2 * x2 - 3. * l2 - 3. * SQRT5 * l * (x2 - x1) + 20. * x1 * x2)
        / c;
    let e43 = -50. * (x1 + x2) / c;
    let e44 = 25. / c;
    let e4a41 = e40
        + m * e41
        + (m * m + v) * e42
        + (m.powi(3) + 3. * v * m) * e43
        + (m.powi(4) + 6. * v * m * m + 3. * v * v) * e44;
    let e4a42 = e41
        + (m + x1) * e42
        + (m * m + 2. * v + x1 * x1 + m * x1) * e43
        + (m.powi(3) + x1.powi(3) + x1 * m * m + m * x1 * x1 + 3. * v * x1 + 5. * v * m) * e44;
    let e4a43 = e41
        + (m + x2) * e42
        + (m * m + 2. * v + x2 * x2 + m * x2) * e43
        + (m.powi(3) + x2.powi(3) + x2 * m * m + m * x2 * x2 + 3. * v * x2 + 5. * v * m) * e44;
    let p2 = (-SQRT5 * (x2 - x1) / l).exp()
        * (0.5 * e4a41 * (erf((x2 - m) / sd2) - erf((x1 - m) / sd2))
            + e4a42 * dens * (-0.5 * (x1 - m) * (x1 - m) / v).exp()
            - e4a43 * dens * (-0.5 * (x2 - m) * (x2 - m) / v).exp());

    // z < x1
    let e50 = 1.
        + (25. * x1 * x1 * x2 * x2 + 3. * SQRT5 * (3. * l3 + 5. * l * x1 * x2) * (x1 + x2)
            + 15. * l2 * (x1 * x1 + x2 * x2 + 3. * x1 * x2))
            / c;
    let e51 = (18. * SQRT5 * l3 + 15. * SQRT5 * l * (x1 * x1 + x2 * x2)
        + (75. * l2 + 50. * x1 * x2) * (x1 + x2)
        + 60. * SQRT5 * l * x1 * x2)
        / c;
    let e52 = 5.
        * (5. * x1 * x1 + 5. * x2 * x2 + 15. * l2 + 9. * SQRT5 * l * (x1 + x2) + 20. * x1 * x2)
        / c;
    let e53 = 10. * (3. * SQRT5 * l + 5. * x1 + 5. * x2) / c;
    let e54 = 25. / c;
    let mu_d = m + 2. * SQRT5 * v / l;
    let e5a51 = e50 - mu_d * e51 + (mu_d * mu_d + v) * e52
        - (mu_d.powi(3) + 3. * v * mu_d) * e53
        + (mu_d.powi(4) + 6. * v * mu_d * mu_d + 3. * v * v) * e54;
    let e5a52 = e51 - (mu_d + x1) * e52 + (mu_d * mu_d + 2. * v + x1 * x1 + mu_d * x1) * e53
        - (mu_d.powi(3) + x1.powi(3) + x1 * mu_d * mu_d + mu_d * x1 * x1 + 3. * v * x1
            + 5. * v * mu_d)
            * e54;
    let a3 = (10. * v - SQRT5 * l * (x1 + x2 - 2. * m)) / l2;
    let p3 = 0.5 * e5a51 * exp_erfc(a3, (mu_d - x1) / sd2)
        + e5a52 * dens * (a3 - 0.5 * (x1 - mu_d) * (x1 - mu_d) / v).exp();

    p1 + p2 + p3
}

impl fmt::Display for Matern52Corr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matern52")
    }
}

/// The kernel family of a GP node.
///
/// Nodes of a same network may use different families, this enum dispatches
/// to the corresponding correlation model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Kernel {
    /// Squared exponential kernel
    #[default]
    SquaredExponential,
    /// Matern 5/2 kernel
    Matern52,
}

impl From<SquaredExponentialCorr> for Kernel {
    fn from(_corr: SquaredExponentialCorr) -> Kernel {
        Kernel::SquaredExponential
    }
}

impl From<Matern52Corr> for Kernel {
    fn from(_corr: Matern52Corr) -> Kernel {
        Kernel::Matern52
    }
}

impl CorrelationModel for Kernel {
    fn corr_1d(&self, x: f64, z: f64, length: f64) -> f64 {
        match self {
            Kernel::SquaredExponential => SquaredExponentialCorr().corr_1d(x, z, length),
            Kernel::Matern52 => Matern52Corr().corr_1d(x, z, length),
        }
    }

    fn expected_corr_1d(&self, x: f64, mean: f64, var: f64, length: f64) -> f64 {
        match self {
            Kernel::SquaredExponential => {
                SquaredExponentialCorr().expected_corr_1d(x, mean, var, length)
            }
            Kernel::Matern52 => Matern52Corr().expected_corr_1d(x, mean, var, length),
        }
    }

    fn expected_corr_product_1d(
        &self,
        x1: f64,
        x2: f64,
        mean: f64,
        var: f64,
        length: f64,
    ) -> f64 {
        match self {
            Kernel::SquaredExponential => {
                SquaredExponentialCorr().expected_corr_product_1d(x1, x2, mean, var, length)
            }
            Kernel::Matern52 => Matern52Corr().expected_corr_product_1d(x1, x2, mean, var, length),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Kernel::SquaredExponential => write!(f, "{}", SquaredExponentialCorr()),
            Kernel::Matern52 => write!(f, "{}", Matern52Corr()),
        }
    }
}
