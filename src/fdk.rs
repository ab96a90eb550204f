//! The Feldkamp-Davis-Kress reconstruction pipeline.
//!
//! For each projection, in index order: copy it out of the sinogram, ramp
//! filter it, and hand it to the backprojector. The backprojector divides by
//! the number of projections when it finishes; nothing else (no rescaling, no
//! clipping) is applied to the result. Any error aborts the whole
//! reconstruction and discards the partial tomogram.

use std::fmt;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use crate::backproject::{check_sinogram, Backprojector, Cpu};
use crate::error::{Error, Result};
use crate::filter::{RampFilter, RampFilterStage};
use crate::geometry::Geometry;
use crate::volume::Volume;

pub struct Feldkamp<B> {
    filter: RampFilter,
    backprojector: B,
    progress: bool,
}

impl Feldkamp<Cpu> {
    pub fn cpu(filter: RampFilter) -> Self { Self::new(filter, Cpu) }
}

impl<B: Backprojector> Feldkamp<B> {

    pub fn new(filter: RampFilter, backprojector: B) -> Self {
        Self { filter, backprojector, progress: false }
    }

    /// Show a progress bar over projections on stderr.
    pub fn with_progress(self, progress: bool) -> Self { Self { progress, ..self } }

    pub fn filter(&self) -> RampFilter { self.filter }

    /// Reconstruct a tomogram from `sinogram`, whose axes are detector column,
    /// detector row and projection index. The sinogram is left untouched.
    pub fn reconstruct(&self, sinogram: &Volume<f32>, geometry: &Geometry) -> Result<Volume<f32>> {
        let n = check_sinogram(sinogram, geometry)?;
        let [w, _] = geometry.detector();
        let stage = RampFilterStage::new(self.filter, w);
        let mut scratch = stage.scratch();
        let mut filtered = vec![0.0; sinogram.plane_len()];

        let bar = self.progress.then(|| progress_bar(n));
        let mut state = self.backprojector.start(geometry, n)?;
        for i in 0..n {
            filtered.copy_from_slice(sinogram.plane(i));
            stage.apply_slice(&mut filtered, &mut scratch);
            self.backprojector.accumulate(&mut state, i, &filtered)?;
            if let Some(bar) = &bar { bar.inc(1) }
        }
        if let Some(bar) = bar { bar.finish_and_clear() }
        self.backprojector.finish(state)
    }
}

fn progress_bar(n: usize) -> ProgressBar {
    let bar = ProgressBar::new(n as u64).with_message("RECON");
    // The template is a literal known to be valid
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})") {
        bar.set_style(style);
    }
    bar
}

/// Where backprojection runs. The set is closed: `Gpu` is only usable when the
/// crate is built with the `gpu` feature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

impl FromStr for Backend {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            _ => Err(Error::UnknownBackend(s.into())),
        }
    }
}

impl TryFrom<String> for Backend {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Cpu => "cpu", Self::Gpu => "gpu" })
    }
}

impl Backend {

    /// Run a complete reconstruction on this backend.
    pub fn reconstruct(
        self,
        filter: RampFilter,
        sinogram: &Volume<f32>,
        geometry: &Geometry,
        progress: bool,
    ) -> Result<Volume<f32>> {
        match self {
            Self::Cpu => Feldkamp::cpu(filter).with_progress(progress).reconstruct(sinogram, geometry),
            #[cfg(feature = "gpu")]
            Self::Gpu => {
                let gpu = crate::backproject::Gpu::new()?;
                Feldkamp::new(filter, gpu).with_progress(progress).reconstruct(sinogram, geometry)
            }
            #[cfg(not(feature = "gpu"))]
            Self::Gpu => Err(Error::Config("GPU backend requested, but cbct was built without the `gpu` feature".into())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::phantom::point_source;
    use rstest::rstest;
    use units::mm;

    fn geometry() -> Geometry {
        Geometry::new([64, 64], [mm(0.8), mm(0.8)], [16, 16, 16], mm(400.0), mm(600.0)).unwrap()
    }

    #[test]
    fn zero_sinogram_gives_zero_tomogram() {
        let g = geometry();
        let sinogram = Volume::new([64, 64, 12]);
        let tomogram = Feldkamp::cpu(RampFilter::RamLak).reconstruct(&sinogram, &g).unwrap();
        assert_eq!(tomogram.size(), [16, 16, 16]);
        assert!(tomogram.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn pipeline_is_filter_then_backproject() {
        let g = geometry();
        let sinogram = point_source(&g, [5, 9, 7], 24);

        let mut filtered = sinogram.clone();
        RampFilterStage::new(RampFilter::SheppLogan, 64).apply_all(&mut filtered).unwrap();
        let expected = Cpu.backproject(&filtered, &g).unwrap();

        let got = Feldkamp::cpu(RampFilter::SheppLogan).reconstruct(&sinogram, &g).unwrap();
        assert_eq!(got, expected);
    }

    #[rstest(filter, case(RampFilter::RamLak), case(RampFilter::SheppLogan))]
    fn point_source_is_recovered(filter: RampFilter) {
        let g = geometry();
        let source = [5, 9, 7];
        let sinogram = point_source(&g, source, 60);
        let tomogram = Feldkamp::cpu(filter).reconstruct(&sinogram, &g).unwrap();
        let peak = tomogram.argmax().unwrap();
        for (p, s) in peak.iter().zip(source) {
            assert!(p.abs_diff(s) <= 1, "peak {peak:?} too far from {source:?}");
        }
    }

    #[test]
    fn mismatched_sinogram_is_rejected() {
        let g = geometry();
        let sinogram = Volume::new([32, 64, 4]);
        let result = Feldkamp::cpu(RampFilter::RamLak).reconstruct(&sinogram, &g);
        assert!(matches!(result, Err(Error::DetectorMismatch { found: [32, 64], expected: [64, 64] })));
    }

    #[rstest(/**/ name , expected,
             case("cpu", Backend::Cpu),
             case("GPU", Backend::Gpu),
    )]
    fn parse_backend_names(name: &str, expected: Backend) {
        assert_eq!(name.parse::<Backend>().unwrap(), expected);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        assert!(matches!("cuda".parse::<Backend>(), Err(Error::UnknownBackend(_))));
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn gpu_backend_needs_gpu_feature() {
        let g = geometry();
        let sinogram = Volume::new([64, 64, 2]);
        let result = Backend::Gpu.reconstruct(RampFilter::RamLak, &sinogram, &g, false);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
