//! Per-frame driver around a [`Face`]: update ordering, acceptance
//! bookkeeping and reinitialisation after a long run of misses.

use crate::config::{Config, SessionConfig};
use crate::detection::CandidateSource;
use crate::face::{Face, Geometry};
use crate::frame::{Candidate, Frame};
use crate::Result;
use log::{debug, info};
use serde::Serialize;

/// Which update accepted a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdatePath {
    /// A detector candidate was fused
    Haar,
    /// The skin-colour blob was fused
    Color,
}

/// Outcome of one processed frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Whether any geometry update was accepted
    pub accepted: bool,
    pub path: Option<UpdatePath>,
    /// Whether the face was (re)initialised on this frame
    pub reset: bool,
    pub geometry: Geometry,
}

/// Running acceptance counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HitStatistics {
    pub frames: u64,
    pub accepted: u64,
    pub haar_accepted: u64,
    pub color_accepted: u64,
    pub resets: u64,
}

impl HitStatistics {
    /// Share of frames with an accepted update, 0 before the first frame
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.accepted as f64 / self.frames as f64
        }
    }

    fn record(&mut self, path: Option<UpdatePath>) {
        self.frames += 1;
        match path {
            Some(UpdatePath::Haar) => {
                self.accepted += 1;
                self.haar_accepted += 1;
            }
            Some(UpdatePath::Color) => {
                self.accepted += 1;
                self.color_accepted += 1;
            }
            None => {}
        }
    }
}

/// Tracks one face across a stream of frames
#[derive(Debug)]
pub struct TrackingSession {
    face: Face,
    config: SessionConfig,
    frame_index: u64,
    last_accepted: Option<u64>,
    frames_since_accept: u64,
    stats: HitStatistics,
}

impl TrackingSession {
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            face: Face::new(config)?,
            config: config.session.clone(),
            frame_index: 0,
            last_accepted: None,
            frames_since_accept: 0,
            stats: HitStatistics::default(),
        })
    }

    #[must_use]
    pub fn face(&self) -> &Face {
        &self.face
    }

    #[must_use]
    pub fn statistics(&self) -> &HitStatistics {
        &self.stats
    }

    /// Index the next processed frame will get
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[must_use]
    pub fn last_accepted(&self) -> Option<u64> {
        self.last_accepted
    }

    #[must_use]
    pub fn frames_since_accept(&self) -> u64 {
        self.frames_since_accept
    }

    /// Ask `source` for candidates, then process the frame
    ///
    /// # Errors
    ///
    /// Propagates errors from the candidate source; the session is not
    /// advanced in that case.
    pub fn process<S, B>(&mut self, frame: &Frame<B>, source: &mut S) -> Result<FrameReport>
    where
        S: CandidateSource + ?Sized,
        B: AsRef<[u8]>,
    {
        let candidates = source.candidates(self.frame_index, &frame.as_view())?;
        Ok(self.process_frame(frame, &candidates))
    }

    /// Run one frame: predict, fuse, relearn colours
    ///
    /// The face is initialised on the first frame and reinitialised once
    /// more than `lost_after_frames` consecutive frames went without an
    /// accepted update.
    pub fn process_frame<B: AsRef<[u8]>>(&mut self, frame: &Frame<B>, candidates: &[Candidate]) -> FrameReport {
        let frame_index = self.frame_index;
        let mut reset = false;
        if !self.face.is_tracking() {
            info!("initialising face tracker on frame {frame_index}");
            self.face.reset(frame);
            self.stats.resets += 1;
            reset = true;
        }

        self.face.geometry_predict();

        let mut path = None;
        if !candidates.is_empty() && self.face.geometry_update_haar(frame, candidates).is_ok() {
            path = Some(UpdatePath::Haar);
        }
        if path.is_none() && self.config.color_fallback && self.face.geometry_update_color(frame).is_ok() {
            path = Some(UpdatePath::Color);
        }

        if path.is_some() {
            self.last_accepted = Some(frame_index);
            self.frames_since_accept = 0;
            self.face.skincolor_update(frame);
        } else {
            self.frames_since_accept += 1;
            debug!("frame {frame_index}: no update accepted ({} in a row)", self.frames_since_accept);
        }

        if self.frames_since_accept > self.config.lost_after_frames {
            info!(
                "no accepted update for {} frames, reinitialising on frame {frame_index}",
                self.frames_since_accept
            );
            self.face.reset(frame);
            self.frames_since_accept = 0;
            self.stats.resets += 1;
            reset = true;
        } else if !reset {
            self.face.bgcolor_update(frame);
        }

        self.stats.record(path);
        self.frame_index += 1;

        FrameReport {
            frame_index,
            accepted: path.is_some(),
            path,
            reset,
            geometry: self.face.geometry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::NoCandidates;

    fn blank(width: usize, height: usize) -> Vec<u8> {
        vec![0u8; width * height * 3]
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = HitStatistics::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.record(Some(UpdatePath::Haar));
        stats.record(None);
        stats.record(Some(UpdatePath::Color));
        stats.record(None);
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!((stats.haar_accepted, stats.color_accepted), (1, 1));
    }

    #[test]
    fn test_first_frame_initialises() {
        let data = blank(64, 48);
        let frame = Frame::packed(&data[..], 64, 48).unwrap();
        let mut session = TrackingSession::new(&Config::default()).unwrap();

        let report = session.process_frame(&frame, &[]);
        assert!(report.reset);
        assert_eq!(report.frame_index, 0);
        assert!(session.face().is_tracking());
        assert_eq!(session.frame_index(), 1);
    }

    #[test]
    fn test_background_is_sampled_once_per_frame() {
        let data = blank(64, 48);
        let frame = Frame::packed(&data[..], 64, 48).unwrap();
        let mut session = TrackingSession::new(&Config::default()).unwrap();

        // every 4th pixel of 64x48
        session.process_frame(&frame, &[]);
        assert_eq!(session.face().bgcolor().total(), 192);

        session.process_frame(&frame, &[]);
        assert_eq!(session.face().bgcolor().total(), 96 + 192);
    }

    #[test]
    fn test_reinitialises_after_long_miss() {
        let data = blank(64, 48);
        let frame = Frame::packed(&data[..], 64, 48).unwrap();
        let mut config = Config::default();
        config.session.lost_after_frames = 2;
        let mut session = TrackingSession::new(&config).unwrap();
        let mut source = NoCandidates;

        // black frames hold no skin mass, so nothing is ever accepted
        let reports: Vec<_> = (0..4).map(|_| session.process(&frame, &mut source).unwrap()).collect();
        assert!(reports.iter().all(|r| !r.accepted));
        assert_eq!(reports.iter().map(|r| r.reset).collect::<Vec<_>>(), vec![true, false, true, false]);
        assert_eq!(session.statistics().resets, 2);
        assert_eq!(session.last_accepted(), None);
    }
}
