//! Backprojection on the CPU, parallelized over `z`-planes of the tomogram.
//!
//! Each rayon job owns one plane of voxels outright and only reads the
//! (shared, immutable) projection and geometry, so no locking is needed.
//! Every voxel sees the projections in index order whatever the number of
//! threads, so results are bit-for-bit reproducible.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::geometry::{projection_angle, ConeBeam, Geometry};
use crate::interpolate::bilerp;
use crate::volume::Volume;

use super::Backprojector;

#[derive(Clone, Copy, Debug, Default)]
pub struct Cpu;

pub struct Accumulator {
    tomogram: Volume<f32>,
    cone_beam: ConeBeam,
    detector: [usize; 2],
    n_projections: usize,
}

impl Backprojector for Cpu {
    type Accumulator = Accumulator;

    fn start(&self, geometry: &Geometry, n_projections: usize) -> Result<Accumulator> {
        if n_projections == 0 { return Err(Error::NoProjections) }
        Ok(Accumulator {
            tomogram: Volume::new(geometry.volume()),
            cone_beam: geometry.cone_beam(),
            detector: geometry.detector(),
            n_projections,
        })
    }

    fn accumulate(&self, state: &mut Accumulator, index: usize, projection: &[f32]) -> Result<()> {
        let Accumulator { tomogram, cone_beam, detector: [w, h], n_projections } = state;
        let (w, h) = (*w, *h);
        if projection.len() != w * h {
            return Err(Error::Shape { size: [w, h, 1], expected: w * h, found: projection.len() });
        }
        let view = cone_beam.at(projection_angle(index, *n_projections));
        let (u_max, v_max) = ((w - 1) as f32, (h - 1) as f32);
        let [nx, ny, _] = tomogram.size();

        tomogram.as_mut_slice()
            .par_chunks_mut(nx * ny)
            .enumerate()
            .for_each(|(z, plane)| {
                for y in 0..ny {
                    for x in 0..nx {
                        let p = view.vox2pix([x as f32, y as f32, z as f32]);
                        if p.u >= 0.0 && p.v >= 0.0 && p.u < u_max && p.v < v_max {
                            plane[y * nx + x] += bilerp(projection, w, h, p.u, p.v) * p.weight;
                        }
                    }
                }
            });
        Ok(())
    }

    fn finish(&self, state: Accumulator) -> Result<Volume<f32>> {
        let Accumulator { mut tomogram, n_projections, .. } = state;
        let n = n_projections as f32;
        tomogram.for_each(|v| v / n);
        Ok(tomogram)
    }
}
