//! Face tracking by fusing Haar detections with a learned skin-colour model.
//!
//! A [`Face`] owns a 5-D Kalman geometry state `[x, y, radius, dx, dy]` and
//! three colour histograms: the foreground (face pixels), the background
//! (whole frames) and the skin likelihood derived from both. `(x, y)` is the
//! geometric face centre reported by the detector; `(dx, dy)` is the offset
//! from there to the centre of the skin-coloured blob, bounded by the radius.
//!
//! Per frame the caller predicts, then updates from detector candidates
//! ([`Face::geometry_update_haar`]) or, without a detector hit, from the skin
//! histogram alone ([`Face::geometry_update_color`]), and finally relearns
//! the colour models. Rejected updates leave the estimate untouched so the
//! prediction carries the track through single-frame misses.
//!
//! The geometry and each histogram sit behind copy-on-write handles:
//! [`Face::deep_copy`] chooses per model whether the fork shares the
//! parent's data until one of them writes, or starts from its own copy.

use crate::colorbins::ColorBins;
use crate::config::{ColorConfig, Config, GeometryConfig};
use crate::constants::{
    COLOR_SCORE_NUMERATOR, COLOR_SCORE_OFFSET, GEOMETRY_DIM, HAAR_OFFSET_COUPLING_X, HAAR_OFFSET_COUPLING_Y,
    HAAR_SIZE_PER_RADIUS, OBSERVATION_DIM, OFFSET_DECAY,
};
use crate::frame::{Candidate, Frame, Rect};
use crate::kalman::{KalmanState, Rejected};
use crate::mtxcore::{self, Matrix, Vector};
use crate::Result;
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Kalman state of the face geometry
pub type GeometryState = KalmanState<GEOMETRY_DIM>;

/// Transposed observation Jacobian, state × observation
pub type Jacobian = Matrix<GEOMETRY_DIM, OBSERVATION_DIM>;

const X: usize = 0;
const Y: usize = 1;
const RADIUS: usize = 2;
const DX: usize = 3;
const DY: usize = 4;

/// Current face estimate, as exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Geometry {
    fn from_mean(mean: &Vector<GEOMETRY_DIM>) -> Self {
        Self {
            x: mean[X],
            y: mean[Y],
            radius: mean[RADIUS],
            dx: mean[DX],
            dy: mean[DY],
        }
    }
}

/// Why a geometry update was skipped
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum UpdateRejected {
    /// The detector returned nothing to fuse
    #[error("no detection candidates")]
    NoCandidates,

    /// Too little skin-coloured mass around the estimate
    #[error("skin mass {mass:.3} below the update floor")]
    InsufficientMass {
        /// Accumulated skin mass in the search window
        mass: f64,
    },

    /// The Kalman posterior did not converge
    #[error(transparent)]
    Kalman(#[from] Rejected),
}

/// Whether a forked model shares the parent's data or gets its own copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Shared until either side writes
    Shared,
    /// Cloned immediately
    Owned,
}

/// Per-model ownership choice for [`Face::deep_copy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fork {
    pub geometry: Ownership,
    pub colors: Ownership,
}

impl Fork {
    /// Nothing copied up front
    pub const SHARED: Self = Self {
        geometry: Ownership::Shared,
        colors: Ownership::Shared,
    };

    /// Everything copied up front
    pub const OWNED: Self = Self {
        geometry: Ownership::Owned,
        colors: Ownership::Owned,
    };
}

/// Haar observation `[center_x, center_y, size]`
fn haar_jacobian() -> Jacobian {
    let mut ht = Jacobian::zeros();
    ht[(X, 0)] = 1.0;
    ht[(Y, 1)] = 1.0;
    ht[(RADIUS, 2)] = HAAR_SIZE_PER_RADIUS;
    ht[(DX, 0)] = HAAR_OFFSET_COUPLING_X;
    ht[(DY, 1)] = HAAR_OFFSET_COUPLING_Y;
    ht
}

/// Skin blob observation `[centroid_x, centroid_y, spread]`
fn color_jacobian() -> Jacobian {
    let mut ht = Jacobian::zeros();
    ht[(X, 0)] = 1.0;
    ht[(Y, 1)] = 1.0;
    ht[(RADIUS, 2)] = 1.0;
    ht[(DX, 0)] = 1.0;
    ht[(DY, 1)] = 1.0;
    ht
}

fn clamp_geometry(mean: &mut Vector<GEOMETRY_DIM>, radius_floor: f64) {
    mean[RADIUS] = mean[RADIUS].max(radius_floor);
    let radius = mean[RADIUS];
    mean[DX] = mean[DX].clamp(-radius, radius);
    mean[DY] = mean[DY].clamp(-radius, radius);
}

fn diagonal_observation(z: Vector<OBSERVATION_DIM>, stddev: [f64; OBSERVATION_DIM]) -> KalmanState<OBSERVATION_DIM> {
    KalmanState::from_mean_var(z, Vector::from(stddev.map(|s| s * s)))
}

fn fork_handle<T: Clone>(handle: &Arc<T>, ownership: Ownership) -> Arc<T> {
    match ownership {
        Ownership::Shared => Arc::clone(handle),
        Ownership::Owned => Arc::new(T::clone(handle)),
    }
}

/// One tracked face
#[derive(Debug)]
pub struct Face {
    geometry: Arc<GeometryState>,
    skincolor: Arc<ColorBins>,
    fgcolor: Arc<ColorBins>,
    bgcolor: Arc<ColorBins>,
    tracking: bool,
    geometry_config: GeometryConfig,
    color_config: ColorConfig,
    rng: StdRng,
}

impl Face {
    /// Untracked face with an uninformative geometry and empty colour models
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let empty = ColorBins::new(config.histogram)?;
        Ok(Self {
            geometry: Arc::new(GeometryState::uninformative()),
            skincolor: Arc::new(empty.clone()),
            fgcolor: Arc::new(empty.clone()),
            bgcolor: Arc::new(empty),
            tracking: false,
            geometry_config: config.geometry.clone(),
            color_config: config.color.clone(),
            rng: StdRng::seed_from_u64(config.color.seed),
        })
    }

    /// Whether [`Face::reset`] has run at least once
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Mean of the geometry estimate
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        Geometry::from_mean(&self.geometry.mean())
    }

    /// Full geometry belief
    #[must_use]
    pub fn geometry_state(&self) -> &GeometryState {
        &self.geometry
    }

    /// Skin likelihood histogram, `fg / (fg + bg)` scaled to `[0, 255]`
    #[must_use]
    pub fn skincolor(&self) -> &ColorBins {
        &self.skincolor
    }

    #[must_use]
    pub fn fgcolor(&self) -> &ColorBins {
        &self.fgcolor
    }

    #[must_use]
    pub fn bgcolor(&self) -> &ColorBins {
        &self.bgcolor
    }

    /// Whether both faces currently point at the same geometry data
    #[must_use]
    pub fn shares_geometry_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.geometry, &other.geometry)
    }

    /// Whether both faces currently point at the same colour models
    #[must_use]
    pub fn shares_colors_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.skincolor, &other.skincolor)
            && Arc::ptr_eq(&self.fgcolor, &other.fgcolor)
            && Arc::ptr_eq(&self.bgcolor, &other.bgcolor)
    }

    /// Fork this face, choosing per model whether data is shared or copied
    #[must_use]
    pub fn deep_copy(&self, fork: Fork) -> Self {
        Self {
            geometry: fork_handle(&self.geometry, fork.geometry),
            skincolor: fork_handle(&self.skincolor, fork.colors),
            fgcolor: fork_handle(&self.fgcolor, fork.colors),
            bgcolor: fork_handle(&self.bgcolor, fork.colors),
            tracking: self.tracking,
            geometry_config: self.geometry_config.clone(),
            color_config: self.color_config.clone(),
            rng: self.rng.clone(),
        }
    }

    /// Start tracking from scratch on `frame`
    ///
    /// Seeds a broad prior centred in the image, folds the whole frame into
    /// the background, reseeds the foreground with synthetic skin particles
    /// and rebuilds the skin likelihood.
    #[allow(clippy::cast_precision_loss)]
    pub fn reset<B: AsRef<[u8]>>(&mut self, frame: &Frame<B>) {
        let width = frame.width() as f64;
        let height = frame.height() as f64;
        let size = width.max(height);
        let g = &self.geometry_config;

        let mean = Vector::<GEOMETRY_DIM>::from([
            0.5 * width,
            0.5 * height,
            (size / 8.0).max(g.radius_floor),
            0.0,
            0.0,
        ]);
        let position_std = g.prior_scale * size;
        let stddev = Vector::<GEOMETRY_DIM>::from([position_std, position_std, size / 2.0, size / 4.0, size / 4.0]);
        let mut cov = Matrix::zeros();
        mtxcore::from_diagonal(&mut cov, &stddev.component_mul(&stddev));
        self.geometry = Arc::new(GeometryState::from_mean_cov(mean, cov));

        let c = &self.color_config;
        let bg = Arc::make_mut(&mut self.bgcolor);
        bg.scale(c.bg_decay);
        bg.add_subimage(frame, frame.bounds(), c.bg_step);

        let fg = Arc::make_mut(&mut self.fgcolor);
        fg.reset();
        fg.add_gaussian_particles(&mut self.rng, c.skin_mean, c.skin_stddev, c.skin_particles);

        self.renormalize_skin();
        self.tracking = true;
        debug!(
            "face reset on {}x{} frame: centre ({:.1}, {:.1}), radius {:.1}",
            frame.width(),
            frame.height(),
            mean[X],
            mean[Y],
            mean[RADIUS]
        );
    }

    fn renormalize_skin(&mut self) {
        Arc::make_mut(&mut self.skincolor).normalize(&self.fgcolor, &self.bgcolor);
    }

    /// Advance the geometry one frame
    ///
    /// Centre and radius variances grow with the squared radius; the
    /// offsets decay toward zero.
    pub fn geometry_predict(&mut self) {
        let g = &self.geometry_config;
        let state = Arc::make_mut(&mut self.geometry);
        let representation = state.representation();
        let mean = state.mean();
        let cov = state.covariance();

        let mut transition = Matrix::<GEOMETRY_DIM, GEOMETRY_DIM>::zeros();
        mtxcore::eye(&mut transition, 1.0);
        transition[(DX, DX)] = OFFSET_DECAY;
        transition[(DY, DY)] = OFFSET_DECAY;

        let mut predicted = Vector::zeros();
        mtxcore::multiply(&mut predicted, &transition, &mean);

        let mut fp = Matrix::zeros();
        mtxcore::multiply(&mut fp, &transition, &cov);
        let mut fpf = Matrix::zeros();
        mtxcore::multiply_nt(&mut fpf, &fp, &transition);

        let r2 = mean[RADIUS] * mean[RADIUS];
        let drift = Vector::<GEOMETRY_DIM>::from([
            g.position_noise * g.position_noise * r2,
            g.position_noise * g.position_noise * r2,
            g.radius_noise * g.radius_noise * r2,
            g.offset_noise * g.offset_noise * r2,
            g.offset_noise * g.offset_noise * r2,
        ]);
        let mut process_noise = Matrix::zeros();
        mtxcore::from_diagonal(&mut process_noise, &drift);

        let mut predicted_cov = Matrix::zeros();
        mtxcore::add(&mut predicted_cov, &fpf, &process_noise);

        clamp_geometry(&mut predicted, g.radius_floor);
        *state = GeometryState::from_mean_cov(predicted, predicted_cov).convert(representation);
    }

    /// Commit one observation to the geometry, or leave it untouched
    fn commit(
        &mut self,
        obs: &KalmanState<OBSERVATION_DIM>,
        hx: &Vector<OBSERVATION_DIM>,
        ht: &Jacobian,
    ) -> std::result::Result<(), UpdateRejected> {
        let radius_floor = self.geometry_config.radius_floor;
        let mut posterior = GeometryState::clone(&self.geometry);
        posterior.update_cov(obs, hx, ht)?;
        posterior.adjust_mean(|mean| clamp_geometry(mean, radius_floor));
        self.geometry = Arc::new(posterior);
        Ok(())
    }

    fn predicted_observation(&self, ht: &Jacobian) -> Vector<OBSERVATION_DIM> {
        let mut hx = Vector::zeros();
        mtxcore::multiply_tn(&mut hx, ht, &self.geometry.mean());
        hx
    }

    /// Fuse the best of the detector's candidates into the geometry
    ///
    /// Each candidate is ranked by the product of its Kalman discrepancy
    /// against the prediction and a colour score that falls as the skin
    /// likelihood inside the box rises. Only the lowest-ranked candidate is
    /// fused.
    ///
    /// # Errors
    ///
    /// [`UpdateRejected::NoCandidates`] for an empty list, or
    /// [`UpdateRejected::Kalman`] if the posterior does not converge. The
    /// geometry is unchanged in both cases.
    pub fn geometry_update_haar<B: AsRef<[u8]>>(
        &mut self,
        frame: &Frame<B>,
        candidates: &[Candidate],
    ) -> std::result::Result<(), UpdateRejected> {
        let ht = haar_jacobian();
        let hx = self.predicted_observation(&ht);
        let c = &self.color_config;
        let g = &self.geometry_config;

        let (combined, obs) = candidates
            .iter()
            .map(|candidate| {
                let size = candidate.size();
                let obs = diagonal_observation(
                    Vector::from([candidate.center_x, candidate.center_y, size]),
                    [g.haar_position_noise * size, g.haar_position_noise * size, g.haar_size_noise * size],
                );
                let geo_score = self.geometry.score(&obs, &hx, &ht);
                let window = candidate.subwindow(c.candidate_window, frame.width(), frame.height());
                let skin = self.skincolor.score_subimage(frame, window, c.candidate_step);
                let color_score = COLOR_SCORE_NUMERATOR / (COLOR_SCORE_OFFSET + skin);
                trace!("candidate {candidate:?}: geometry {geo_score:.4}, colour {color_score:.4}");
                (color_score * geo_score, obs)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .ok_or(UpdateRejected::NoCandidates)?;

        trace!("fusing candidate with combined score {combined:.4}");
        self.commit(&obs, &hx, &ht).inspect_err(|e| debug!("Haar update rejected: {e}"))
    }

    /// Detector-free update from the skin likelihood around the estimate
    ///
    /// Weighs every sampled pixel of a window around the skin blob by its
    /// skin likelihood and fuses the weighted centroid and spread.
    ///
    /// # Errors
    ///
    /// [`UpdateRejected::InsufficientMass`] when the window holds less skin
    /// mass than configured, or [`UpdateRejected::Kalman`] if the posterior
    /// does not converge. The geometry is unchanged in both cases.
    #[allow(clippy::cast_precision_loss)]
    pub fn geometry_update_color<B: AsRef<[u8]>>(&mut self, frame: &Frame<B>) -> std::result::Result<(), UpdateRejected> {
        let c = &self.color_config;
        let g = &self.geometry_config;
        let current = self.geometry();
        let skin_total = self.skincolor.total() as f64;

        let half = c.search_window * current.radius;
        let window = Rect::around(
            current.x + current.dx,
            current.y + current.dy,
            half,
            half,
            frame.width(),
            frame.height(),
        );

        let mut mass = 0.0;
        let (mut sx, mut sy, mut sxx, mut syy) = (0.0, 0.0, 0.0, 0.0);
        if skin_total > 0.0 {
            for (x, y, pixel) in frame.samples(window, c.search_step) {
                let weight = f64::from(self.skincolor.score_pixel(pixel)) / skin_total;
                if weight <= 0.0 {
                    continue;
                }
                let (x, y) = (x as f64, y as f64);
                mass += weight;
                sx += weight * x;
                sy += weight * y;
                sxx += weight * x * x;
                syy += weight * y * y;
            }
        }

        if mass <= 0.0 || mass < c.min_mass {
            debug!("colour update skipped: skin mass {mass:.3} below {:.3}", c.min_mass);
            return Err(UpdateRejected::InsufficientMass { mass });
        }

        let mx = sx / mass;
        let my = sy / mass;
        let var_x = (sxx / mass - mx * mx).max(0.0);
        let var_y = (syy / mass - my * my).max(0.0);
        // a uniform disc of radius r has a per-axis standard deviation of r/2
        let spread = 2.0 * (var_x * var_y).sqrt().sqrt();

        let radius = current.radius;
        let obs = diagonal_observation(
            Vector::from([mx, my, spread]),
            [
                g.color_position_noise * radius,
                g.color_position_noise * radius,
                g.color_size_noise * radius,
            ],
        );
        trace!("colour observation: centroid ({mx:.1}, {my:.1}), spread {spread:.1}, mass {mass:.2}");

        let ht = color_jacobian();
        let hx = self.predicted_observation(&ht);
        self.commit(&obs, &hx, &ht).inspect_err(|e| debug!("colour update rejected: {e}"))
    }

    /// Relearn the foreground from the face window, if the face is static
    ///
    /// Large `dx, dy` offsets mean the skin blob and the detected face
    /// disagree, so nothing is learned. Returns whether relearning ran.
    pub fn skincolor_update<B: AsRef<[u8]>>(&mut self, frame: &Frame<B>) -> bool {
        let current = self.geometry();
        let c = &self.color_config;
        let limit = c.static_threshold * current.radius;
        if current.dx.abs() > limit || current.dy.abs() > limit {
            debug!(
                "skin relearning skipped: offset ({:.1}, {:.1}) exceeds {limit:.1}",
                current.dx, current.dy
            );
            return false;
        }

        let half = c.skin_window * current.radius;
        let window = Rect::around(current.x, current.y, half, half, frame.width(), frame.height());
        if window.is_empty() {
            return false;
        }

        let fg = Arc::make_mut(&mut self.fgcolor);
        fg.scale(c.fg_decay);
        fg.add_subimage(frame, window, c.skin_step);
        fg.saturate_inbins(c.fg_saturation);
        self.renormalize_skin();
        true
    }

    /// Decay the background and fold in coarse samples of the whole frame
    pub fn bgcolor_update<B: AsRef<[u8]>>(&mut self, frame: &Frame<B>) {
        let c = &self.color_config;
        let bg = Arc::make_mut(&mut self.bgcolor);
        bg.scale(c.bg_decay);
        bg.add_subimage(frame, frame.bounds(), c.bg_step);
    }
}
