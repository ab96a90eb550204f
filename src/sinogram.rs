//! Preprocessing of measured projections into the negative-log attenuation
//! that reconstruction expects.

use rayon::prelude::*;

use units::todo::Intensityf32;

use crate::error::{Error, Result};
use crate::volume::Volume;

/// Transmissions are floored here before taking logarithms, so that pixels
/// which recorded no counts give a large but finite attenuation.
pub const MIN_TRANSMISSION: f32 = 1e-6;

/// Flat/dark-field correction of every projection in place:
/// `(raw - dark) / (bright - dark)`, clipped to `[0, 1]`.
///
/// `bright` (open beam) and `dark` (no beam) are single detector frames.
/// Pixels where `bright` does not exceed `dark` carry no information and are
/// set to 0.
pub fn flat_field(sinogram: &mut Volume<f32>, bright: &[f32], dark: &[f32]) -> Result<()> {
    let [w, h, _] = sinogram.size();
    for frame in [bright, dark] {
        if frame.len() != w * h {
            return Err(Error::Shape { size: [w, h, 1], expected: w * h, found: frame.len() });
        }
    }
    if w * h == 0 { return Ok(()) }
    sinogram.as_mut_slice()
        .par_chunks_mut(w * h)
        .for_each(|projection| {
            for ((p, &b), &d) in projection.iter_mut().zip(bright).zip(dark) {
                let range = b - d;
                *p = if range > 0.0 { ((*p - d) / range).clamp(0.0, 1.0) } else { 0.0 };
            }
        });
    Ok(())
}

/// Convert intensities into attenuation `-ln(I / free_ray)` in place, where
/// `free_ray` is the intensity recorded through air.
pub fn to_attenuation(sinogram: &mut Volume<f32>, free_ray: Intensityf32) -> Result<()> {
    if !(free_ray.is_finite() && free_ray > 0.0) {
        return Err(Error::Config(format!("free-ray intensity must be positive, got {free_ray}")));
    }
    sinogram.for_each(|i| -(i / free_ray).max(MIN_TRANSMISSION).ln());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    #[test]
    fn flat_field_maps_dark_to_zero_and_bright_to_one() {
        let bright = vec![100.0, 200.0, 50.0, 10.0];
        let dark   = vec![ 10.0,  20.0, 50.0, 20.0];
        let raw = vec![
            10.0, 200.0, 60.0, 15.0,  // dark, bright, dead pixel, inverted pixel
            55.0, 290.0,  0.0,  0.0,  // halfway, overexposed
        ];
        let mut sinogram = Volume::from_vec([2, 2, 2], raw).unwrap();
        flat_field(&mut sinogram, &bright, &dark).unwrap();
        pretty_assertions::assert_eq!(sinogram.as_slice(), &[0.0, 1.0, 0.0, 0.0,
                                                              0.5, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn flat_field_frames_must_match_detector() {
        let mut sinogram = Volume::new([2, 2, 3]);
        let result = flat_field(&mut sinogram, &[1.0; 4], &[0.0; 3]);
        assert!(matches!(result, Err(Error::Shape { expected: 4, found: 3, .. })));
    }

    #[rstest(/**/ intensity, expected,
             case(6000.0   , 0.0),
             case(3000.0   , std::f32::consts::LN_2),
             case(60.0     , 100.0_f32.ln()),
             // No counts: floored, finite
             case(0.0      , -MIN_TRANSMISSION.ln()),
    )]
    fn attenuation(intensity: f32, expected: f32) {
        let mut sinogram = Volume::from_vec([1, 1, 1], vec![intensity]).unwrap();
        to_attenuation(&mut sinogram, 6000.0).unwrap();
        assert_float_eq!(sinogram.as_slice()[0], expected, abs <= 1e-5);
    }

    #[test]
    fn free_ray_must_be_positive() {
        let mut sinogram = Volume::new([1, 1, 1]);
        assert!(matches!(to_attenuation(&mut sinogram, 0.0), Err(Error::Config(_))));
    }
}
