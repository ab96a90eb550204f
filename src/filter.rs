//! Frequency-domain ramp filtering of projections, one detector row at a time.
//!
//! Each row is Fourier transformed, every frequency bin is multiplied by the
//! kernel value at its normalized frequency `q = min(x, w-x) / (w/2)`, and the
//! result is transformed back and rescaled by `1/w`. The kernel is symmetric
//! about the Nyquist bin, so real rows stay real.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{ArrayViewMut1, ArrayViewMut2, Axis};
use num_complex::Complex32;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use serde::Deserialize;

use units::todo::Ratiof32;

use crate::error::{Error, Result};
use crate::volume::Volume;

const TWO_OVER_PI: f32 = std::f32::consts::FRAC_2_PI;
const HALF_PI    : f32 = std::f32::consts::FRAC_PI_2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum RampFilter {
    /// `|q|`
    RamLak,
    /// `(2/π) |sin(πq/2)|`: the ramp rolled off towards the Nyquist frequency
    #[default]
    SheppLogan,
}

impl RampFilter {

    #[inline]
    pub fn kernel(self, q: Ratiof32) -> f32 {
        match self {
            Self::RamLak     => q.abs(),
            Self::SheppLogan => TWO_OVER_PI * (HALF_PI * q).sin().abs(),
        }
    }
}

/// Normalized frequency of the `x`-th bin of a `width`-point DFT: 0 at DC,
/// 1 at Nyquist.
#[inline]
pub fn frequency(x: usize, width: usize) -> Ratiof32 {
    x.min(width - x) as f32 / (0.5 * width as f32)
}

impl FromStr for RampFilter {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "ramlak"     => Ok(Self::RamLak),
            "shepplogan" => Ok(Self::SheppLogan),
            _ => Err(Error::UnknownFilter(s.into())),
        }
    }
}

impl TryFrom<String> for RampFilter {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl fmt::Display for RampFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RamLak     => "ram-lak",
            Self::SheppLogan => "shepp-logan",
        })
    }
}

/// A ramp filter planned for one detector width. Cheap to share between
/// threads; each thread brings its own `Scratch`.
#[derive(Clone)]
pub struct RampFilterStage {
    filter: RampFilter,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    /// Kernel value of each frequency bin, with the `1/width` normalization of
    /// the inverse transform folded in.
    weights: Vec<f32>,
}

/// Per-thread frequency-domain working memory.
pub struct Scratch {
    row: Vec<Complex32>,
    fft: Vec<Complex32>,
}

impl RampFilterStage {

    pub fn new(filter: RampFilter, width: usize) -> Self {
        assert!(width > 0, "Cannot filter zero-width projections");
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(width);
        let inverse = planner.plan_fft_inverse(width);
        let scale = 1.0 / width as f32;
        let weights = (0..width)
            .map(|x| filter.kernel(frequency(x, width)) * scale)
            .collect();
        Self { filter, forward, inverse, weights }
    }

    pub fn filter(&self) -> RampFilter { self.filter }

    pub fn width(&self) -> usize { self.weights.len() }

    pub fn scratch(&self) -> Scratch {
        let fft_len = self.forward.get_inplace_scratch_len()
            .max(self.inverse.get_inplace_scratch_len());
        Scratch {
            row: vec![Complex32::default(); self.width()],
            fft: vec![Complex32::default(); fft_len],
        }
    }

    /// Filter one detector row in place.
    pub fn apply_row(&self, mut row: ArrayViewMut1<f32>, scratch: &mut Scratch) {
        assert_eq!(row.len(), self.width(), "Row length does not match planned filter width");
        let Scratch { row: buffer, fft } = scratch;
        for (b, &r) in buffer.iter_mut().zip(row.iter()) {
            *b = Complex32::new(r, 0.0);
        }
        self.forward.process_with_scratch(buffer, fft);
        for (b, &w) in buffer.iter_mut().zip(&self.weights) {
            *b *= w;
        }
        self.inverse.process_with_scratch(buffer, fft);
        for (r, b) in row.iter_mut().zip(buffer.iter()) {
            *r = b.re;
        }
    }

    /// Filter every row of one projection (shape `[height, width]`) in place.
    pub fn apply(&self, mut projection: ArrayViewMut2<f32>, scratch: &mut Scratch) {
        for row in projection.rows_mut() {
            self.apply_row(row, scratch);
        }
    }

    /// Filter a projection held as a flat slice of consecutive detector rows.
    pub fn apply_slice(&self, projection: &mut [f32], scratch: &mut Scratch) {
        assert_eq!(projection.len() % self.width(), 0, "Projection is not a whole number of rows");
        for row in projection.chunks_exact_mut(self.width()) {
            self.apply_row(ArrayViewMut1::from(row), scratch);
        }
    }

    /// Filter every projection of a sinogram (axes: detector column, detector
    /// row, projection) in place. Projections are processed in parallel, each
    /// rayon job with its own scratch memory.
    pub fn apply_all(&self, sinogram: &mut Volume<f32>) -> Result<()> {
        let [w, h, _] = sinogram.size();
        if w != self.width() {
            return Err(Error::DetectorMismatch { found: [w, h], expected: [self.width(), h] });
        }
        sinogram.view_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each_init(|| self.scratch(), |scratch, projection| self.apply(projection, scratch));
        Ok(())
    }
}
