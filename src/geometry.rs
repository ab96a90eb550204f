//! Circular cone-beam scan geometry.
//!
//! A point source and a flat detector rotate together about the `z` axis of
//! the volume. At angle `θ = 0` the source sits at distance `sod` on the
//! negative side of the `x` axis, the detector plane is perpendicular to `x` at
//! distance `sdd` from the source, and its columns (`u`) run along `y` while
//! its rows (`v`) run along `z`.
//!
//! `Geometry` is the immutable, unit-checked description supplied by
//! configuration. `ConeBeam` is the same information boiled down to `f32`
//! millimetres, which is what both backprojection backends consume; its
//! `View`s (the geometry frozen at one rotation angle) provide the projection
//! function itself.

use units::{mm_, ratio_, radian_, Length, Ratio, TWOPI};
use units::todo::{Anglef32, Lengthf32, Weightf32};

use crate::error::{Error, Result};
use crate::index::BoxDim_u;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    detector: [usize; 2],
    pixel_size: [Length; 2],
    volume: BoxDim_u,
    sod: Length,
    sdd: Length,
}

impl Geometry {

    /// # Errors
    ///
    /// The geometry is rejected if any size is zero, if any length is not
    /// finite and positive, if the detector lies closer to the source than the
    /// rotation axis, or if some voxel could reach the plane of the source
    /// (where the projection is singular).
    pub fn new(
        detector  : [usize; 2],
        pixel_size: [Length; 2],
        volume    : BoxDim_u,
        sod       : Length,
        sdd       : Length,
    ) -> Result<Self> {
        let bad = |message: String| Err(Error::Geometry(message));
        if detector.contains(&0) { return bad(format!("detector size {detector:?} has a zero dimension")) }
        if volume  .contains(&0) { return bad(format!("volume size {volume:?} has a zero dimension")) }
        for (name, l) in [("pixel width", pixel_size[0]), ("pixel height", pixel_size[1]), ("sod", sod), ("sdd", sdd)] {
            let l = mm_(l);
            if !(l.is_finite() && l > 0.0) { return bad(format!("{name} must be positive, got {l} mm")) }
        }
        if sdd < sod {
            return bad(format!("sdd ({} mm) must not be smaller than sod ({} mm)", mm_(sdd), mm_(sod)))
        }
        let geometry = Self { detector, pixel_size, volume, sod, sdd };
        let reach = geometry.bounding_radius();
        if reach >= sod {
            return bad(format!("volume reaches {} mm from the rotation axis, beyond the source at {} mm",
                               mm_(reach), mm_(sod)))
        }
        Ok(geometry)
    }

    pub fn detector  (&self) -> [usize; 2]  { self.detector }
    pub fn pixel_size(&self) -> [Length; 2] { self.pixel_size }
    pub fn volume    (&self) -> BoxDim_u    { self.volume }
    pub fn sod       (&self) -> Length      { self.sod }
    pub fn sdd       (&self) -> Length      { self.sdd }

    /// Cone-beam magnification of objects on the rotation axis.
    pub fn magnification(&self) -> Ratio { self.sdd / self.sod }

    /// Isotropic voxel pitch: the detector width demagnified onto the rotation
    /// axis and shared out among the voxels along `x`.
    pub fn voxel_size(&self) -> Length {
        let detector_width = self.pixel_size[0] * self.detector[0] as f32;
        detector_width * ratio_(self.sod / self.sdd) / self.volume[0] as f32
    }

    /// Largest distance of any voxel from the rotation axis.
    fn bounding_radius(&self) -> Length {
        let [nx, ny, _] = self.volume;
        let (hx, hy) = (nx as f32 / 2.0, ny as f32 / 2.0);
        self.voxel_size() * (hx * hx + hy * hy).sqrt()
    }

    pub fn cone_beam(&self) -> ConeBeam {
        let [dw, dh] = self.detector;
        let [nx, ny, nz] = self.volume;
        ConeBeam {
            detector:   [dw as f32, dh as f32],
            pixel_size: [mm_(self.pixel_size[0]), mm_(self.pixel_size[1])],
            centre:     [nx as f32 * 0.5, ny as f32 * 0.5, nz as f32 * 0.5],
            voxel_size: mm_(self.voxel_size()),
            sod:        mm_(self.sod),
            sdd:        mm_(self.sdd),
        }
    }

    /// Project a (possibly fractional) voxel index at rotation angle `theta`.
    pub fn vox2pix(&self, index: [f32; 3], theta: Anglef32) -> Projection {
        self.cone_beam().vox2pix(index, theta)
    }
}

/// Angle of the `i`-th of `n` projections, equally spaced over a full turn.
pub fn projection_angle(i: usize, n: usize) -> Anglef32 {
    radian_(TWOPI * i as f32 / n as f32)
}

/// Detector position of a projected point, in (fractional) pixels, and the
/// cone-beam weight `sdd / sqrt(sdd² + u² + v²)` of the ray through it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub u: f32,
    pub v: f32,
    pub weight: Weightf32,
}

/// `Geometry` in plain `f32`s: lengths in mm, sizes in pixels or voxels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConeBeam {
    pub detector: [f32; 2],
    pub pixel_size: [Lengthf32; 2],
    /// Voxel index of the rotation centre.
    pub centre: [f32; 3],
    pub voxel_size: Lengthf32,
    pub sod: Lengthf32,
    pub sdd: Lengthf32,
}

impl ConeBeam {

    /// The geometry frozen at a single rotation angle.
    #[inline]
    pub fn at(&self, theta: Anglef32) -> View {
        let (sin, cos) = theta.sin_cos();
        View { geometry: *self, cos, sin }
    }

    pub fn vox2pix(&self, index: [f32; 3], theta: Anglef32) -> Projection {
        self.at(theta).vox2pix(index)
    }

    pub fn project(&self, xyz: [Lengthf32; 3], theta: Anglef32) -> Projection {
        self.at(theta).project(xyz)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct View {
    pub geometry: ConeBeam,
    pub cos: f32,
    pub sin: f32,
}

impl View {

    /// Rotate a point given in mm (relative to the rotation centre) about `z`,
    /// and project it through the source onto the detector.
    #[inline]
    pub fn project(&self, [x, y, z]: [Lengthf32; 3]) -> Projection {
        let ConeBeam { detector, pixel_size, sod, sdd, .. } = self.geometry;
        let vx = x * self.cos - y * self.sin + sod;
        let vy = x * self.sin + y * self.cos;
        let vz = z;
        let u = vy * sdd / vx.abs();
        let v = vz * sdd / vx.abs();
        let weight = sdd / (sdd * sdd + u * u + v * v).sqrt();
        Projection {
            u: u / pixel_size[0] + detector[0] * 0.5,
            v: v / pixel_size[1] + detector[1] * 0.5,
            weight,
        }
    }

    #[inline]
    pub fn vox2pix(&self, [i, j, k]: [f32; 3]) -> Projection {
        let ConeBeam { centre: [cx, cy, cz], voxel_size: s, .. } = self.geometry;
        self.project([(i - cx) * s, (j - cy) * s, (k - cz) * s])
    }
}
