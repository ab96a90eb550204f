//! Synthetic sinograms for testing and demonstration.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::geometry::{projection_angle, Geometry};
use crate::index::{in_bounds, Index3_u};
use crate::interpolate::splat;
use crate::volume::Volume;

/// Reject a point source that does not lie inside the reconstructed volume.
pub fn check_voxel(geometry: &Geometry, voxel: Index3_u) -> Result<()> {
    if in_bounds(voxel, geometry.volume()) { return Ok(()) }
    Err(Error::Geometry(format!("point source {voxel:?} lies outside volume {:?}", geometry.volume())))
}

/// Forward project a single bright voxel through `n_projections` equally
/// spaced angles.
///
/// Each projection receives unit intensity, spread over the four detector
/// pixels around the point where the voxel projects, using the same geometry
/// model as backprojection. Angles at which the voxel falls outside the
/// detector leave their projection empty.
pub fn point_source(geometry: &Geometry, voxel: Index3_u, n_projections: usize) -> Volume<f32> {
    assert!(in_bounds(voxel, geometry.volume()), "Point source {voxel:?} lies outside volume {:?}", geometry.volume());
    let [w, h] = geometry.detector();
    let cone_beam = geometry.cone_beam();
    let [x, y, z] = voxel;
    let index = [x as f32, y as f32, z as f32];
    let (u_max, v_max) = ((w - 1) as f32, (h - 1) as f32);

    let mut sinogram = Volume::new([w, h, n_projections]);
    sinogram.as_mut_slice()
        .par_chunks_mut(w * h)
        .enumerate()
        .for_each(|(i, projection)| {
            let p = cone_beam.vox2pix(index, projection_angle(i, n_projections));
            if p.u >= 0.0 && p.v >= 0.0 && p.u < u_max && p.v < v_max {
                splat(projection, w, h, p.u, p.v, 1.0);
            }
        });
    sinogram
}
