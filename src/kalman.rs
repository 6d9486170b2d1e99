//! Gaussian state estimator with interchangeable representations.
//!
//! A [`KalmanState`] stores the same belief as either a mean/covariance pair,
//! an information vector/matrix pair (`y = P⁻¹x`, `Y = P⁻¹`) or a mean with
//! independent per-dimension variances. Covariance and Information convert
//! into each other exactly (up to inversion rounding); converting anything to
//! Diagonal drops the correlations for good.
//!
//! Observations are themselves `KalmanState`s: the mean is the measured
//! value `z` and the covariance is the measurement noise `R`. The observation
//! model is given linearized as the predicted measurement `hx` and the
//! transposed Jacobian `Ht` (state × observation, `Ht[(i, j)] = ∂h_j/∂x_i`).
//!
//! Every update converts the state into the form it works in and stores the
//! posterior back in the representation the state had before the call. A
//! posterior that fails the convergence check is discarded and the state is
//! left untouched.

use crate::constants::{COVARIANCE_SENTINEL, UNINFORMATIVE_VARIANCE};
use crate::mtxcore::{self, Matrix, Vector};
use thiserror::Error;

/// Which payload a [`KalmanState`] currently carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Mean and full covariance
    Covariance,
    /// Information vector and information (inverse covariance) matrix
    Information,
    /// Mean and per-dimension variances, no correlations
    Diagonal,
}

/// Gaussian belief over an `N`-dimensional state
#[derive(Debug, Clone, PartialEq)]
pub enum KalmanState<const N: usize> {
    /// Mean `x` and covariance `P`
    Covariance { mean: Vector<N>, cov: Matrix<N, N> },
    /// Information vector `y = P⁻¹x` and information matrix `Y = P⁻¹`
    Information { info_vec: Vector<N>, info: Matrix<N, N> },
    /// Mean `x` and the diagonal of `P`
    Diagonal { mean: Vector<N>, var: Vector<N> },
}

/// Why an update was refused; the state is unchanged in every case
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum Rejected {
    /// The posterior still has a variance above the convergence sentinel
    #[error("posterior variance {max_variance:e} exceeds the convergence sentinel")]
    NotConverged {
        /// Largest posterior variance
        max_variance: f64,
    },

    /// The posterior contains NaN or infinite variances
    #[error("posterior covariance is not finite")]
    NonFinite,
}

impl<const N: usize> KalmanState<N> {
    /// Zero mean with a huge (but finite) isotropic covariance
    #[must_use]
    pub fn uninformative() -> Self {
        Self::Covariance {
            mean: Vector::zeros(),
            cov: Matrix::from_diagonal_element(UNINFORMATIVE_VARIANCE),
        }
    }

    /// Covariance-form state
    #[must_use]
    pub fn from_mean_cov(mean: Vector<N>, cov: Matrix<N, N>) -> Self {
        Self::Covariance { mean, cov }
    }

    /// Diagonal-form state
    #[must_use]
    pub fn from_mean_var(mean: Vector<N>, var: Vector<N>) -> Self {
        Self::Diagonal { mean, var }
    }

    /// Current representation tag
    #[must_use]
    pub fn representation(&self) -> Representation {
        match self {
            Self::Covariance { .. } => Representation::Covariance,
            Self::Information { .. } => Representation::Information,
            Self::Diagonal { .. } => Representation::Diagonal,
        }
    }

    /// State dimension
    #[must_use]
    pub const fn dim(&self) -> usize {
        N
    }

    /// Mean of the belief, whatever the representation
    #[must_use]
    pub fn mean(&self) -> Vector<N> {
        match self {
            Self::Covariance { mean, .. } | Self::Diagonal { mean, .. } => *mean,
            Self::Information { .. } => self.covariance_parts().0,
        }
    }

    /// Full covariance of the belief (diagonal for [`Representation::Diagonal`])
    #[must_use]
    pub fn covariance(&self) -> Matrix<N, N> {
        self.covariance_parts().1
    }

    /// Per-dimension variances
    #[must_use]
    pub fn variances(&self) -> Vector<N> {
        self.diagonal_parts().1
    }

    /// Edit the mean in place, keeping the covariance and representation
    pub fn adjust_mean(&mut self, edit: impl FnOnce(&mut Vector<N>)) {
        match self {
            Self::Covariance { mean, .. } | Self::Diagonal { mean, .. } => edit(mean),
            Self::Information { .. } => {
                let (mut mean, cov) = self.covariance_parts();
                edit(&mut mean);
                *self = Self::Covariance { mean, cov }.to_information();
            }
        }
    }

    fn covariance_parts(&self) -> (Vector<N>, Matrix<N, N>) {
        match self {
            Self::Covariance { mean, cov } => (*mean, *cov),
            Self::Information { info_vec, info } => {
                let mut cov = Matrix::zeros();
                mtxcore::invert(&mut cov, info);
                mtxcore::symmetrize(&mut cov);
                let mut mean = Vector::zeros();
                mtxcore::multiply(&mut mean, &cov, info_vec);
                (mean, cov)
            }
            Self::Diagonal { mean, var } => {
                let mut cov = Matrix::zeros();
                mtxcore::from_diagonal(&mut cov, var);
                (*mean, cov)
            }
        }
    }

    fn information_parts(&self) -> (Vector<N>, Matrix<N, N>) {
        match self {
            Self::Information { info_vec, info } => (*info_vec, *info),
            Self::Diagonal { mean, var } => {
                let inv_var = var.map(|v| 1.0 / v);
                let mut info = Matrix::zeros();
                mtxcore::from_diagonal(&mut info, &inv_var);
                (mean.component_mul(&inv_var), info)
            }
            Self::Covariance { mean, cov } => {
                let mut info = Matrix::zeros();
                mtxcore::invert(&mut info, cov);
                mtxcore::symmetrize(&mut info);
                let mut info_vec = Vector::zeros();
                mtxcore::multiply(&mut info_vec, &info, mean);
                (info_vec, info)
            }
        }
    }

    fn diagonal_parts(&self) -> (Vector<N>, Vector<N>) {
        match self {
            Self::Diagonal { mean, var } => (*mean, *var),
            _ => {
                let (mean, cov) = self.covariance_parts();
                let mut var = Vector::zeros();
                mtxcore::diagonal(&mut var, &cov);
                (mean, var)
            }
        }
    }

    /// Same belief in covariance form (exact)
    #[must_use]
    pub fn to_covariance(&self) -> Self {
        let (mean, cov) = self.covariance_parts();
        Self::Covariance { mean, cov }
    }

    /// Same belief in information form (exact)
    #[must_use]
    pub fn to_information(&self) -> Self {
        let (info_vec, info) = self.information_parts();
        Self::Information { info_vec, info }
    }

    /// Marginal variances only; correlations are lost
    #[must_use]
    pub fn to_diagonal(&self) -> Self {
        let (mean, var) = self.diagonal_parts();
        Self::Diagonal { mean, var }
    }

    /// Convert to the given representation
    #[must_use]
    pub fn convert(&self, representation: Representation) -> Self {
        match representation {
            Representation::Covariance => self.to_covariance(),
            Representation::Information => self.to_information(),
            Representation::Diagonal => self.to_diagonal(),
        }
    }

    /// Innovation `z - hx` and innovation covariance `S = HᵗPH + R`, plus `P Ht`
    fn innovation<const M: usize>(
        cov: &Matrix<N, N>,
        obs: &KalmanState<M>,
        hx: &Vector<M>,
        ht: &Matrix<N, M>,
    ) -> (Vector<M>, Matrix<M, M>, Matrix<N, M>) {
        let (z, r) = obs.covariance_parts();

        let mut innovation = Vector::zeros();
        mtxcore::sub(&mut innovation, &z, hx);

        let mut pht = Matrix::zeros();
        mtxcore::multiply(&mut pht, cov, ht);

        let mut hpht = Matrix::zeros();
        mtxcore::multiply_tn(&mut hpht, ht, &pht);

        let mut s = Matrix::zeros();
        mtxcore::add(&mut s, &hpht, &r);
        mtxcore::symmetrize(&mut s);

        (innovation, s, pht)
    }

    /// Classic gain update: `K = P Ht S⁻¹`, `x += K(z - hx)`, `P -= K Hᵗ P`
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] when the posterior fails the convergence check;
    /// the state is unchanged in that case.
    pub fn update_cov<const M: usize>(
        &mut self,
        obs: &KalmanState<M>,
        hx: &Vector<M>,
        ht: &Matrix<N, M>,
    ) -> Result<(), Rejected> {
        let (mut mean, mut cov) = self.covariance_parts();
        let (innovation, s, pht) = Self::innovation(&cov, obs, hx, ht);

        let mut s_inv = Matrix::zeros();
        mtxcore::invert(&mut s_inv, &s);

        let mut gain = Matrix::<N, M>::zeros();
        mtxcore::multiply(&mut gain, &pht, &s_inv);

        let mut correction = Vector::zeros();
        mtxcore::multiply(&mut correction, &gain, &innovation);
        mtxcore::add_scale(&mut mean, &correction, 1.0);

        // K Hᵗ P == K (P Ht)ᵗ for symmetric P
        let mut khp = Matrix::zeros();
        mtxcore::multiply_nt(&mut khp, &gain, &pht);
        mtxcore::add_scale(&mut cov, &khp, -1.0);
        mtxcore::symmetrize(&mut cov);

        let mut var = Vector::zeros();
        mtxcore::diagonal(&mut var, &cov);
        check_converged(&var)?;

        let representation = self.representation();
        *self = Self::Covariance { mean, cov }.convert(representation);
        Ok(())
    }

    /// Additive information-form update, equivalent to [`Self::update_cov`]
    ///
    /// `Y += Ht R⁻¹ Hᵗ`, `y += Ht R⁻¹ (z - hx + Hᵗx)`.
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] when the posterior fails the convergence check;
    /// the state is unchanged in that case.
    pub fn update_info<const M: usize>(
        &mut self,
        obs: &KalmanState<M>,
        hx: &Vector<M>,
        ht: &Matrix<N, M>,
    ) -> Result<(), Rejected> {
        let prior_mean = self.mean();
        let (mut info_vec, mut info) = self.information_parts();
        let (z, r) = obs.covariance_parts();

        let mut r_inv = Matrix::zeros();
        mtxcore::invert(&mut r_inv, &r);

        let mut ht_r_inv = Matrix::<N, M>::zeros();
        mtxcore::multiply(&mut ht_r_inv, ht, &r_inv);

        let mut gained = Matrix::zeros();
        mtxcore::multiply_nt(&mut gained, &ht_r_inv, ht);
        mtxcore::add_scale(&mut info, &gained, 1.0);
        mtxcore::symmetrize(&mut info);

        let mut linearized = Vector::<M>::zeros();
        mtxcore::multiply_tn(&mut linearized, ht, &prior_mean);
        let mut pseudo_obs = Vector::<M>::zeros();
        mtxcore::sub(&mut pseudo_obs, &z, hx);
        mtxcore::add_scale(&mut pseudo_obs, &linearized, 1.0);

        let mut contribution = Vector::zeros();
        mtxcore::multiply(&mut contribution, &ht_r_inv, &pseudo_obs);
        mtxcore::add_scale(&mut info_vec, &contribution, 1.0);

        let posterior = Self::Information { info_vec, info };
        check_converged(&posterior.variances())?;

        let representation = self.representation();
        *self = posterior.convert(representation);
        Ok(())
    }

    /// Per-dimension approximation: each observation component is fused as
    /// an independent scalar measurement into the marginal variances
    ///
    /// # Errors
    ///
    /// Returns [`Rejected`] when the posterior fails the convergence check;
    /// the state is unchanged in that case.
    pub fn update_diag<const M: usize>(
        &mut self,
        obs: &KalmanState<M>,
        hx: &Vector<M>,
        ht: &Matrix<N, M>,
    ) -> Result<(), Rejected> {
        let (mut mean, mut var) = self.diagonal_parts();
        let prior_mean = mean;
        let noise = obs.variances();
        let z = obs.mean();

        for j in 0..M {
            let mut s = noise[j];
            let mut predicted = hx[j];
            for i in 0..N {
                s += ht[(i, j)] * ht[(i, j)] * var[i];
                predicted += ht[(i, j)] * (mean[i] - prior_mean[i]);
            }
            let residual = z[j] - predicted;
            for i in 0..N {
                let gain = var[i] * ht[(i, j)] / s;
                mean[i] += gain * residual;
                var[i] -= gain * ht[(i, j)] * var[i];
            }
        }

        check_converged(&var)?;

        let representation = self.representation();
        *self = Self::Diagonal { mean, var }.convert(representation);
        Ok(())
    }

    /// Mahalanobis discrepancy `(z - hx)ᵗ S⁻¹ (z - hx)` with the same `S` as
    /// [`Self::update_cov`]; lower means a better fit
    #[must_use]
    pub fn score<const M: usize>(&self, obs: &KalmanState<M>, hx: &Vector<M>, ht: &Matrix<N, M>) -> f64 {
        let cov = self.covariance();
        let (innovation, s, _) = Self::innovation(&cov, obs, hx, ht);

        let mut s_inv = Matrix::zeros();
        mtxcore::invert(&mut s_inv, &s);
        mtxcore::quadratic_form(&innovation, &s_inv)
    }
}

/// Reject posteriors whose variances are not finite or exceed the sentinel
fn check_converged<const N: usize>(var: &Vector<N>) -> Result<(), Rejected> {
    if var.iter().any(|v| !v.is_finite()) {
        return Err(Rejected::NonFinite);
    }
    let max_variance = var.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max_variance > COVARIANCE_SENTINEL {
        return Err(Rejected::NotConverged { max_variance });
    }
    Ok(())
}
