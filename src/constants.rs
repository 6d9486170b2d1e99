//! Constants used throughout the tracker

/// Dimension of the face geometry state `[x, y, radius, dx, dy]`
pub const GEOMETRY_DIM: usize = 5;

/// Dimension of both observation models `[center_x, center_y, size]`
pub const OBSERVATION_DIM: usize = 3;

/// Posterior variances above this value mean the estimate has not converged
pub const COVARIANCE_SENTINEL: f64 = 1e16;

/// Variance of a freshly created, uninformed state (large but finite)
pub const UNINFORMATIVE_VARIANCE: f64 = 1e12;

/// Per-frame decay of the `dx, dy` offsets
pub const OFFSET_DECAY: f64 = 0.9;

/// Numerator of the Haar candidate colour score
pub const COLOR_SCORE_NUMERATOR: f64 = 0.3;

/// Offset keeping the Haar candidate colour score finite on skinless windows
pub const COLOR_SCORE_OFFSET: f64 = 0.01;

/// Haar observation Jacobian: coupling of `dx` into the detected centre x
pub const HAAR_OFFSET_COUPLING_X: f64 = 0.1;

/// Haar observation Jacobian: coupling of `dy` into the detected centre y
pub const HAAR_OFFSET_COUPLING_Y: f64 = -0.1;

/// Haar boxes measure the face diameter
pub const HAAR_SIZE_PER_RADIUS: f64 = 2.0;

/// Number of coarse outlier bins (below/in/above per channel, 3^3)
pub const OUTLIER_BINS: usize = 27;

/// Total assigned to a histogram by [`crate::colorbins::ColorBins::normalize`]
pub const NORMALIZED_TOTAL: u64 = 255;

/// Largest value a normalized or divided bin may hold
pub const MAX_LIKELIHOOD: u32 = 255;

/// Neutral chroma value for 8-bit U/V channels
pub const NEUTRAL_CHROMA: f64 = 128.0;
