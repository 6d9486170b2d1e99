//! Face tracking library fusing detector boxes with a learned skin-colour model.
//!
//! This library provides:
//! - A fixed-dimension linear algebra kernel over `nalgebra`
//! - A Kalman estimator with covariance, information and diagonal forms
//! - Three-channel colour histograms with foreground/background likelihoods
//! - The face tracker combining both, plus a per-frame session driver
//!
//! Each frame the tracker predicts the face geometry `[x, y, radius, dx, dy]`,
//! fuses the best detector candidate (or, without one, the skin-coloured
//! blob around the estimate), and relearns its colour models. Updates whose
//! posterior does not converge are dropped so a single bad frame cannot
//! corrupt the track.
//!
//! # Examples
//!
//! ## Tracking a frame sequence
//!
//! ```no_run
//! use facetrack::{config::Config, frame::Candidate, session::TrackingSession};
//! use facetrack::utils::image_conversion::YuvImage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = TrackingSession::new(&Config::default())?;
//!
//! for path in ["frame_000.png", "frame_001.png"] {
//!     let image = YuvImage::open(path)?;
//!     let frame = image.as_frame()?;
//!     // Boxes from any face detector, in pixels
//!     let candidates = [Candidate::new(160.0, 120.0, 80.0, 80.0)];
//!
//!     let report = session.process_frame(&frame, &candidates);
//!     let g = report.geometry;
//!     println!("accepted={} centre=({:.1}, {:.1}) radius={:.1}", report.accepted, g.x, g.y, g.radius);
//! }
//! println!("hit rate {:.2}", session.statistics().hit_rate());
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving the face model directly
//!
//! ```no_run
//! use facetrack::{config::Config, face::{Face, Fork}, frame::Frame};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pixels = vec![0u8; 320 * 240 * 3];
//! let frame = Frame::packed(&pixels[..], 320, 240)?;
//!
//! let mut face = Face::new(&Config::default())?;
//! face.reset(&frame);
//!
//! // Try a colour-only update on a fork without touching the parent
//! let mut what_if = face.deep_copy(Fork::SHARED);
//! what_if.geometry_predict();
//! if what_if.geometry_update_color(&frame).is_err() {
//!     println!("not enough skin around {:?}", face.geometry());
//! }
//! # Ok(())
//! # }
//! ```

/// Fixed-dimension dense matrix and Cholesky routines
pub mod mtxcore;

/// Gaussian state estimation in covariance, information and diagonal form
pub mod kalman;

/// Quantized colour histograms and likelihood models
pub mod colorbins;

/// Face geometry and colour model fusion
pub mod face;

/// Pixel buffers, windows and detector boxes
pub mod frame;

/// Candidate sources for the detector-fused update
pub mod detection;

/// Per-frame tracking driver and hit statistics
pub mod session;

/// Conversion helpers for images and numeric casts
pub mod utils;

/// Error types and result handling
pub mod error;

/// Constants used throughout the tracker
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
