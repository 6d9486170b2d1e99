//! Sources of face candidates for the Haar-fused update.
//!
//! The tracker treats the detector as opaque: anything that can turn a frame
//! into a list of candidate boxes implements [`CandidateSource`].

use crate::frame::{Candidate, Frame};
use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Trait for all candidate sources
pub trait CandidateSource: Send {
    /// Candidate boxes for the frame at `frame_index`
    fn candidates(&mut self, frame_index: u64, frame: &Frame<&[u8]>) -> Result<Vec<Candidate>>;

    /// Get source name
    fn name(&self) -> &str;
}

/// Source that never detects anything, leaving tracking to the colour model
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCandidates;

impl CandidateSource for NoCandidates {
    fn candidates(&mut self, _frame_index: u64, _frame: &Frame<&[u8]>) -> Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// On-disk format of a candidate script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateScript {
    /// Keep at most this many boxes per frame, in script order
    pub max_candidates: Option<usize>,

    /// Detections keyed by frame index; missing frames have none
    pub frames: BTreeMap<u64, Vec<Candidate>>,
}

/// Replays detections recorded in a YAML script
///
/// ```yaml
/// max_candidates: 4
/// frames:
///   0:
///     - { center_x: 160.0, center_y: 120.0, width: 80.0, height: 80.0 }
///   3: []
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedCandidates {
    script: CandidateScript,
}

impl ScriptedCandidates {
    #[must_use]
    pub fn new(script: CandidateScript) -> Self {
        Self { script }
    }

    /// Load a script from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid script.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a script from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::CandidateScript`] if the text does not parse, has a
    /// zero `max_candidates` cap, or lists an invalid box.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let script: CandidateScript = serde_yaml::from_str(content)
            .map_err(|e| Error::CandidateScript(format!("Failed to parse candidate script: {e}")))?;
        if script.max_candidates == Some(0) {
            return Err(Error::CandidateScript("max_candidates must be greater than 0".to_string()));
        }
        if let Some((index, _)) = script
            .frames
            .iter()
            .find(|(_, boxes)| boxes.iter().any(|c| !(c.width > 0.0 && c.height > 0.0)))
        {
            return Err(Error::CandidateScript(format!(
                "Frame {index} has a box without positive extent"
            )));
        }
        Ok(Self::new(script))
    }

    #[must_use]
    pub fn script(&self) -> &CandidateScript {
        &self.script
    }
}

impl CandidateSource for ScriptedCandidates {
    fn candidates(&mut self, frame_index: u64, _frame: &Frame<&[u8]>) -> Result<Vec<Candidate>> {
        let recorded = self.script.frames.get(&frame_index).map_or(&[][..], Vec::as_slice);
        let limit = self.script.max_candidates.unwrap_or(recorded.len());
        if recorded.len() > limit {
            debug!("frame {frame_index}: keeping {limit} of {} scripted boxes", recorded.len());
        }
        Ok(recorded.iter().take(limit).copied().collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
