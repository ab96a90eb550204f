//! Weighted backprojection of filtered projections into a tomogram.
//!
//! The `Backprojector` trait abstracts over where the work happens: on the
//! CPU with rayon (`Cpu`) or on a GPU through wgpu (`Gpu`, behind the `gpu`
//! feature). Both implementations take their geometry from the same
//! `ConeBeam` model and follow the same recipe: for every voxel and every
//! projection angle `θᵢ = 2πi/N`, project the voxel onto the detector; if the
//! projection lands inside `[0, w-1) x [0, h-1)`, add the bilinearly
//! interpolated filtered value times the cone-beam weight to the voxel; after
//! the last angle divide every voxel by `N`. Rays which miss the detector
//! simply contribute nothing.
//!
//! Projections are fed in one at a time (`accumulate`), so that the pipeline
//! can filter each projection just before it is backprojected.

pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;

pub use cpu::Cpu;
#[cfg(feature = "gpu")]
pub use gpu::Gpu;

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::volume::Volume;

pub trait Backprojector {

    /// Running state of one reconstruction: the partially accumulated
    /// tomogram and whatever else the backend needs to keep between angles.
    type Accumulator;

    /// Prepare an empty tomogram for `n_projections` equally spaced angles.
    fn start(&self, geometry: &Geometry, n_projections: usize) -> Result<Self::Accumulator>;

    /// Add the contribution of the `index`-th filtered projection, given as a
    /// flat, row-major (`u` fastest) detector image.
    fn accumulate(&self, state: &mut Self::Accumulator, index: usize, projection: &[f32]) -> Result<()>;

    /// Normalize by the number of projections and hand over the tomogram.
    fn finish(&self, state: Self::Accumulator) -> Result<Volume<f32>>;

    /// Backproject a complete stack of filtered projections (axes: detector
    /// column, detector row, projection index).
    fn backproject(&self, filtered: &Volume<f32>, geometry: &Geometry) -> Result<Volume<f32>> {
        let n = check_sinogram(filtered, geometry)?;
        let mut state = self.start(geometry, n)?;
        for i in 0..n {
            self.accumulate(&mut state, i, filtered.plane(i))?;
        }
        self.finish(state)
    }
}

/// Ensure that the projections in `sinogram` match the detector described by
/// `geometry`, and return the number of projections.
pub fn check_sinogram(sinogram: &Volume<f32>, geometry: &Geometry) -> Result<usize> {
    let [w, h, n] = sinogram.size();
    let expected = geometry.detector();
    if [w, h] != expected { return Err(Error::DetectorMismatch { found: [w, h], expected }) }
    if n == 0 { return Err(Error::NoProjections) }
    Ok(n)
}
