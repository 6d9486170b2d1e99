//! Quantized three-channel colour histograms.
//!
//! Each channel has an inclusive range `[min, max]` split linearly into
//! `bins` cells. A pixel inside the range on all three channels lands in one
//! cell of the fine `ny × nu × nv` interior grid; a pixel outside the range on
//! at least one channel lands in one of 27 coarse outlier bins addressed by
//! its below/inside/above class per channel. Every pixel lands in exactly one
//! bin.
//!
//! Counts are unsigned. `total` is the sum of all bins, except right after
//! [`ColorBins::normalize`], which sets it to 255 so that a normalized
//! histogram reads directly as a likelihood in `[0, 1]` after dividing by
//! `total`.

use crate::constants::{MAX_LIKELIHOOD, NEUTRAL_CHROMA, NORMALIZED_TOTAL, OUTLIER_BINS};
use crate::frame::{Frame, Rect};
use crate::utils::safe_cast::{f64_to_count, f64_to_u8_saturate};
use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Inclusive value range of one channel and the number of interior cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    pub min: u8,
    pub max: u8,
    pub bins: usize,
}

/// Where a channel value falls relative to its range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    Below,
    Inside(usize),
    Above,
}

impl ChannelClass {
    const fn coarse(self) -> usize {
        match self {
            Self::Below => 0,
            Self::Inside(_) => 1,
            Self::Above => 2,
        }
    }
}

impl ChannelRange {
    #[must_use]
    pub const fn new(min: u8, max: u8, bins: usize) -> Self {
        Self { min, max, bins }
    }

    /// Linear quantization of `value` against this range
    #[must_use]
    pub fn classify(&self, value: u8) -> ChannelClass {
        if value < self.min {
            ChannelClass::Below
        } else if value > self.max {
            ChannelClass::Above
        } else {
            let span = usize::from(self.max - self.min) + 1;
            ChannelClass::Inside(usize::from(value - self.min) * self.bins / span)
        }
    }

    fn validate(&self, channel: &str) -> Result<()> {
        if self.min > self.max {
            return Err(Error::InvalidRange(format!(
                "{channel} range [{}, {}] is inverted",
                self.min, self.max
            )));
        }
        if self.bins == 0 {
            return Err(Error::InvalidRange(format!("{channel} range has no bins")));
        }
        let span = usize::from(self.max - self.min) + 1;
        if self.bins > span {
            return Err(Error::InvalidRange(format!(
                "{channel} range [{}, {}] cannot hold {} bins",
                self.min, self.max, self.bins
            )));
        }
        Ok(())
    }
}

/// Ranges and resolution of all three channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRanges {
    pub y: ChannelRange,
    pub u: ChannelRange,
    pub v: ChannelRange,
}

impl BinRanges {
    #[must_use]
    pub const fn new(y: ChannelRange, u: ChannelRange, v: ChannelRange) -> Self {
        Self { y, u, v }
    }

    /// Number of interior cells
    #[must_use]
    pub const fn inbin_count(&self) -> usize {
        self.y.bins * self.u.bins * self.v.bins
    }

    /// Check every channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] for an inverted range, zero bins,
    /// more bins than values in a channel, or a grid too large to address.
    pub fn validate(&self) -> Result<()> {
        self.y.validate("Y")?;
        self.u.validate("U")?;
        self.v.validate("V")?;
        self.y
            .bins
            .checked_mul(self.u.bins)
            .and_then(|n| n.checked_mul(self.v.bins))
            .map(|_| ())
            .ok_or_else(|| Error::InvalidRange("interior grid size overflows".to_string()))
    }
}

impl Default for BinRanges {
    fn default() -> Self {
        Self {
            y: ChannelRange::new(60, 240, 10),
            u: ChannelRange::new(100, 150, 10),
            v: ChannelRange::new(120, 170, 10),
        }
    }
}

/// The single bin a pixel is counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinIndex {
    /// Flat index into the interior grid, `(iy * nu + iu) * nv + iv`
    Inlier(usize),
    /// Index into the outlier bins, `cy * 9 + cu * 3 + cv`
    Outlier(usize),
}

/// Colour histogram with a fine interior grid and 27 coarse outlier bins
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBins {
    ranges: BinRanges,
    inbins: Vec<u32>,
    outbins: [u32; OUTLIER_BINS],
    total: u64,
}

impl ColorBins {
    /// Empty histogram over `ranges`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if any channel range is unusable.
    pub fn new(ranges: BinRanges) -> Result<Self> {
        ranges.validate()?;
        Ok(Self {
            ranges,
            inbins: vec![0; ranges.inbin_count()],
            outbins: [0; OUTLIER_BINS],
            total: 0,
        })
    }

    #[must_use]
    pub fn ranges(&self) -> &BinRanges {
        &self.ranges
    }

    /// Sum of all bins (255 right after [`Self::normalize`])
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn inbins(&self) -> &[u32] {
        &self.inbins
    }

    #[must_use]
    pub fn outbins(&self) -> &[u32; OUTLIER_BINS] {
        &self.outbins
    }

    /// Zero every bin and the total
    pub fn reset(&mut self) {
        self.inbins.fill(0);
        self.outbins = [0; OUTLIER_BINS];
        self.total = 0;
    }

    /// Bin a pixel falls into
    #[must_use]
    pub fn classify(&self, pixel: [u8; 3]) -> BinIndex {
        let cy = self.ranges.y.classify(pixel[0]);
        let cu = self.ranges.u.classify(pixel[1]);
        let cv = self.ranges.v.classify(pixel[2]);
        match (cy, cu, cv) {
            (ChannelClass::Inside(iy), ChannelClass::Inside(iu), ChannelClass::Inside(iv)) => {
                BinIndex::Inlier((iy * self.ranges.u.bins + iu) * self.ranges.v.bins + iv)
            }
            _ => BinIndex::Outlier(cy.coarse() * 9 + cu.coarse() * 3 + cv.coarse()),
        }
    }

    /// Count stored in `index`
    #[must_use]
    pub fn count(&self, index: BinIndex) -> u32 {
        match index {
            BinIndex::Inlier(i) => self.inbins[i],
            BinIndex::Outlier(i) => self.outbins[i],
        }
    }

    fn count_mut(&mut self, index: BinIndex) -> &mut u32 {
        match index {
            BinIndex::Inlier(i) => &mut self.inbins[i],
            BinIndex::Outlier(i) => &mut self.outbins[i],
        }
    }

    fn bins_mut(&mut self) -> impl Iterator<Item = &mut u32> {
        self.inbins.iter_mut().chain(self.outbins.iter_mut())
    }

    fn bins(&self) -> impl Iterator<Item = &u32> {
        self.inbins.iter().chain(self.outbins.iter())
    }

    fn recount(&mut self) {
        self.total = self.bins().map(|&c| u64::from(c)).sum();
    }

    /// Count one pixel; a bin already at `u32::MAX` stays full and the
    /// total is unchanged
    pub fn add_pixel(&mut self, pixel: [u8; 3]) {
        let index = self.classify(pixel);
        let bin = self.count_mut(index);
        if let Some(next) = bin.checked_add(1) {
            *bin = next;
            self.total += 1;
        }
    }

    /// Count every `step`-th pixel of `rect` in both axes
    pub fn add_subimage<B: AsRef<[u8]>>(&mut self, frame: &Frame<B>, rect: Rect, step: usize) {
        for (_, _, pixel) in frame.samples(rect, step) {
            self.add_pixel(pixel);
        }
    }

    /// Count `count` synthetic pixels drawn per channel from independent
    /// Gaussians (Box–Muller), rounded and saturated to `[0, 255]`
    pub fn add_gaussian_particles<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        mean: [f64; 3],
        stddev: [f64; 3],
        count: usize,
    ) {
        for _ in 0..count {
            let pixel = std::array::from_fn(|c| f64_to_u8_saturate(mean[c] + stddev[c] * standard_normal(rng)));
            self.add_pixel(pixel);
        }
    }

    /// Raw occupancy of the bin `pixel` falls into
    #[must_use]
    pub fn score_pixel(&self, pixel: [u8; 3]) -> u32 {
        self.count(self.classify(pixel))
    }

    /// Mean occupancy over the sampled pixels of `rect`, divided by `total`
    ///
    /// Zero for an empty histogram or a window with no samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score_subimage<B: AsRef<[u8]>>(&self, frame: &Frame<B>, rect: Rect, step: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let (sum, samples) = frame
            .samples(rect, step)
            .fold((0u64, 0u64), |(sum, n), (_, _, pixel)| (sum + u64::from(self.score_pixel(pixel)), n + 1));
        if samples == 0 {
            return 0.0;
        }
        sum as f64 / samples as f64 / self.total as f64
    }

    /// Pull each pixel's chroma toward neutral by its likelihood
    /// `score_pixel / total`, clamped to `[0, 1]` (for visual inspection)
    ///
    /// An empty histogram washes out every pixel.
    #[allow(clippy::cast_precision_loss)]
    pub fn score_image<B: AsRef<[u8]> + AsMut<[u8]>>(&self, frame: &mut Frame<B>) {
        let total = self.total as f64;
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let [luma, u, v] = frame.pixel(x, y);
                let weight = if self.total == 0 {
                    0.0
                } else {
                    (f64::from(self.score_pixel([luma, u, v])) / total).min(1.0)
                };
                let rescale = |c: u8| f64_to_u8_saturate(NEUTRAL_CHROMA + (f64::from(c) - NEUTRAL_CHROMA) * weight);
                frame.set_pixel(x, y, [luma, rescale(u), rescale(v)]);
            }
        }
    }

    /// `self[bin] = 255·bg.total·fg[bin] / (fg.total·bg[bin] + bg.total·fg[bin])`
    ///
    /// The per-bin posterior probability of foreground scaled to `[0, 255]`;
    /// bins with no foreground mass score 0. Sets `total` to 255.
    #[allow(clippy::cast_precision_loss)]
    pub fn normalize(&mut self, fg: &Self, bg: &Self) {
        debug_assert_eq!(self.ranges, fg.ranges, "normalize over mismatched histograms");
        debug_assert_eq!(self.ranges, bg.ranges, "normalize over mismatched histograms");

        let fg_total = fg.total as f64;
        let bg_total = bg.total as f64;
        for (dst, (&f, &b)) in self.bins_mut().zip(fg.bins().zip(bg.bins())) {
            let numerator = bg_total * f64::from(f);
            let denominator = fg_total * f64::from(b) + numerator;
            *dst = if f == 0 || denominator <= 0.0 {
                0
            } else {
                f64_to_count(255.0 * numerator / denominator).min(MAX_LIKELIHOOD)
            };
        }
        self.total = NORMALIZED_TOTAL;
    }

    /// `self[bin] = 255 · (num[bin]/num.total) / (den[bin]/den.total)`,
    /// clamped to `[0, 255]`
    ///
    /// Bins without numerator mass are 0; numerator mass over an empty
    /// denominator bin saturates at 255.
    #[allow(clippy::cast_precision_loss)]
    pub fn divide(&mut self, num: &Self, den: &Self) {
        debug_assert_eq!(self.ranges, num.ranges, "divide over mismatched histograms");
        debug_assert_eq!(self.ranges, den.ranges, "divide over mismatched histograms");

        let num_total = num.total as f64;
        let den_total = den.total as f64;
        for (dst, (&n, &d)) in self.bins_mut().zip(num.bins().zip(den.bins())) {
            *dst = if n == 0 {
                0
            } else if d == 0 || num_total <= 0.0 {
                MAX_LIKELIHOOD
            } else {
                let ratio = 255.0 * f64::from(n) * den_total / (f64::from(d) * num_total);
                f64_to_count(ratio).min(MAX_LIKELIHOOD)
            };
        }
        self.recount();
    }

    /// Multiply every bin by `factor` (truncating), e.g. for exponential decay
    pub fn scale(&mut self, factor: f64) {
        for bin in self.bins_mut() {
            *bin = f64_to_count(f64::from(*bin) * factor);
        }
        self.recount();
    }

    /// Cap every interior bin at `cap`
    pub fn saturate_inbins(&mut self, cap: u32) {
        for bin in &mut self.inbins {
            *bin = (*bin).min(cap);
        }
        self.recount();
    }
}

/// One standard normal sample via the Box–Muller transform
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - U lies in (0, 1], keeping ln finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bins() -> ColorBins {
        ColorBins::new(BinRanges::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_ranges() {
        let inverted = BinRanges::new(ChannelRange::new(200, 100, 4), ChannelRange::new(0, 255, 4), ChannelRange::new(0, 255, 4));
        assert!(ColorBins::new(inverted).is_err());

        let empty = BinRanges::new(ChannelRange::new(0, 255, 4), ChannelRange::new(0, 255, 0), ChannelRange::new(0, 255, 4));
        assert!(ColorBins::new(empty).is_err());

        let wide = ChannelRange::new(0, 255, 1 << 22);
        assert!(ColorBins::new(BinRanges::new(wide, wide, wide)).is_err());
        let crowded = BinRanges::new(ChannelRange::new(10, 12, 4), ChannelRange::new(0, 255, 4), ChannelRange::new(0, 255, 4));
        assert!(ColorBins::new(crowded).is_err());

        let finest = ChannelRange::new(0, 255, 256);
        assert!(BinRanges::new(finest, ChannelRange::new(7, 7, 1), finest).validate().is_ok());
    }

    #[test]
    fn test_channel_quantization_edges() {
        let range = ChannelRange::new(60, 240, 10);
        assert_eq!(range.classify(59), ChannelClass::Below);
        assert_eq!(range.classify(60), ChannelClass::Inside(0));
        assert_eq!(range.classify(240), ChannelClass::Inside(9));
        assert_eq!(range.classify(241), ChannelClass::Above);
    }

    #[test]
    fn test_classify_outliers() {
        let hist = bins();
        assert_eq!(hist.classify([0, 0, 0]), BinIndex::Outlier(0));
        assert_eq!(hist.classify([255, 255, 255]), BinIndex::Outlier(26));
        assert_eq!(hist.classify([140, 0, 145]), BinIndex::Outlier(9 + 1));
        assert_eq!(hist.classify([140, 120, 145]), BinIndex::Inlier((4 * 10 + 3) * 10 + 4));
    }

    #[test]
    fn test_add_pixel_counts_total() {
        let mut hist = bins();
        hist.add_pixel([140, 120, 145]);
        hist.add_pixel([140, 120, 145]);
        hist.add_pixel([0, 0, 0]);
        assert_eq!(hist.total(), 3);
        assert_eq!(hist.score_pixel([140, 120, 145]), 2);
        assert_eq!(hist.outbins()[0], 1);

        hist.reset();
        assert_eq!(hist.total(), 0);
        assert_eq!(hist.score_pixel([140, 120, 145]), 0);
    }

    #[test]
    fn test_full_bin_keeps_total_consistent() {
        let mut hist = bins();
        let pixel = [140, 120, 145];
        let BinIndex::Inlier(i) = hist.classify(pixel) else {
            panic!("pixel should fall inside the grid");
        };
        hist.inbins[i] = u32::MAX;
        hist.outbins[0] = u32::MAX;
        hist.recount();

        hist.add_pixel(pixel);
        hist.add_pixel([0, 0, 0]);
        assert_eq!(hist.score_pixel(pixel), u32::MAX);
        assert_eq!(hist.total(), 2 * u64::from(u32::MAX));

        hist.add_pixel([200, 140, 160]);
        let sum: u64 = hist.bins().map(|&c| u64::from(c)).sum();
        assert_eq!(hist.total(), sum);
    }

    #[test]
    fn test_gaussian_particles_are_deterministic_per_seed() {
        let mut a = bins();
        let mut b = bins();
        a.add_gaussian_particles(&mut StdRng::seed_from_u64(7), [140.0, 120.0, 145.0], [50.0, 5.0, 5.0], 500);
        b.add_gaussian_particles(&mut StdRng::seed_from_u64(7), [140.0, 120.0, 145.0], [50.0, 5.0, 5.0], 500);
        assert_eq!(a, b);
        assert_eq!(a.total(), 500);
    }

    #[test]
    fn test_zero_stddev_particles_hit_one_bin() {
        let mut hist = bins();
        hist.add_gaussian_particles(&mut StdRng::seed_from_u64(1), [140.0, 120.0, 145.0], [0.0; 3], 10);
        assert_eq!(hist.score_pixel([140, 120, 145]), 10);
    }

    #[test]
    fn test_normalize_zero_fg_scores_zero() {
        let mut fg = bins();
        let mut bg = bins();
        let mut skin = bins();
        fg.add_pixel([140, 120, 145]);
        bg.add_pixel([0, 0, 0]);
        bg.add_pixel([140, 120, 145]);

        skin.normalize(&fg, &bg);
        assert_eq!(skin.total(), 255);
        assert_eq!(skin.score_pixel([0, 0, 0]), 0);
        // 255 * 2 * 1 / (1 * 1 + 2 * 1) = 170
        assert_eq!(skin.score_pixel([140, 120, 145]), 170);
    }

    #[test]
    fn test_normalize_background_edge_cases() {
        let mut fg = bins();
        let bg = bins();
        let mut skin = bins();
        fg.add_pixel([140, 120, 145]);
        skin.normalize(&fg, &bg);
        assert_eq!(skin.score_pixel([140, 120, 145]), 0);

        let mut bg = bins();
        bg.add_pixel([0, 0, 0]);
        skin.normalize(&fg, &bg);
        assert_eq!(skin.score_pixel([140, 120, 145]), 255);
    }

    #[test]
    fn test_divide() {
        let mut num = bins();
        let mut den = bins();
        let mut ratio = bins();
        num.add_pixel([140, 120, 145]);
        num.add_pixel([0, 0, 0]);
        den.add_pixel([140, 120, 145]);
        den.add_pixel([140, 120, 145]);
        den.add_pixel([140, 120, 145]);
        den.add_pixel([255, 255, 255]);

        ratio.divide(&num, &den);
        // (1/2) / (3/4) * 255 = 170
        assert_eq!(ratio.score_pixel([140, 120, 145]), 170);
        // numerator mass over an empty denominator bin saturates
        assert_eq!(ratio.score_pixel([0, 0, 0]), 255);
        assert_eq!(ratio.score_pixel([255, 255, 255]), 0);
        assert_eq!(ratio.total(), 425);
    }

    #[test]
    fn test_scale_and_saturate() {
        let mut hist = bins();
        for _ in 0..10 {
            hist.add_pixel([140, 120, 145]);
        }
        for _ in 0..5 {
            hist.add_pixel([0, 0, 0]);
        }

        hist.scale(0.5);
        assert_eq!(hist.score_pixel([140, 120, 145]), 5);
        assert_eq!(hist.score_pixel([0, 0, 0]), 2);
        assert_eq!(hist.total(), 7);

        hist.saturate_inbins(3);
        assert_eq!(hist.score_pixel([140, 120, 145]), 3);
        assert_eq!(hist.score_pixel([0, 0, 0]), 2);
        assert_eq!(hist.total(), 5);
    }

    #[test]
    fn test_subimage_accumulate_and_score() {
        let mut data = vec![0u8; 8 * 8 * 3];
        let mut frame = Frame::packed(&mut data[..], 8, 8).unwrap();
        for y in 0..4 {
            for x in 0..8 {
                frame.set_pixel(x, y, [140, 120, 145]);
            }
        }

        let mut hist = bins();
        hist.add_subimage(&frame, frame.bounds(), 1);
        assert_eq!(hist.total(), 64);

        // top half: every sample hits the 32-count bin
        let top = hist.score_subimage(&frame, Rect::new(0, 0, 8, 4), 1);
        assert!((top - 0.5).abs() < 1e-12);

        let empty = bins();
        assert_eq!(empty.score_subimage(&frame, frame.bounds(), 1), 0.0);
        assert_eq!(hist.score_subimage(&frame, Rect::new(0, 0, 0, 0), 1), 0.0);
    }

    #[test]
    fn test_score_image_neutralizes_unlikely_chroma() {
        let mut data = vec![0u8; 2 * 3];
        let mut frame = Frame::packed(&mut data[..], 2, 1).unwrap();
        frame.set_pixel(0, 0, [140, 120, 145]);
        frame.set_pixel(1, 0, [30, 200, 20]);

        let mut hist = bins();
        hist.add_pixel([140, 120, 145]);
        hist.score_image(&mut frame);

        assert_eq!(frame.pixel(0, 0), [140, 120, 145]);
        assert_eq!(frame.pixel(1, 0), [30, 128, 128]);
    }

    #[test]
    fn test_score_image_weights_by_share_of_total() {
        let mut data = vec![0u8; 2 * 3];
        let mut frame = Frame::packed(&mut data[..], 2, 1).unwrap();
        frame.set_pixel(0, 0, [140, 120, 148]);
        frame.set_pixel(1, 0, [140, 110, 130]);

        let mut hist = bins();
        for _ in 0..2 {
            hist.add_pixel([140, 120, 148]);
            hist.add_pixel([140, 110, 130]);
        }
        assert_ne!(hist.classify([140, 120, 148]), hist.classify([140, 110, 130]));
        hist.score_image(&mut frame);

        // each colour holds half of the mass
        assert_eq!(frame.pixel(0, 0), [140, 124, 138]);
        assert_eq!(frame.pixel(1, 0), [140, 119, 129]);
    }

    #[test]
    fn test_score_image_with_empty_histogram_washes_out() {
        let mut data = vec![0u8; 3];
        let mut frame = Frame::packed(&mut data[..], 1, 1).unwrap();
        frame.set_pixel(0, 0, [90, 60, 200]);
        bins().score_image(&mut frame);
        assert_eq!(frame.pixel(0, 0), [90, 128, 128]);
    }
}
