//! Bilinear sampling of a single detector plane.
//!
//! Kept free of any backend concerns: the WGSL backprojection kernel carries a
//! line-by-line transcription of `bilerp`.

use units::todo::Lengthf32;

#[inline]
fn clamp(v: isize, lo: isize, hi: isize) -> usize {
    v.max(lo).min(hi) as usize
}

/// Sample a `width` x `height` row-major (`x` fastest) image at fractional
/// pixel coordinates `(x, y)`.
///
/// The base pixel is clamped to `[0, width-2] x [0, height-2]`, so the four
/// neighbours are always inside the image; callers are expected to keep
/// `(x, y)` within `[0, width-1) x [0, height-1)`, where the result is a true
/// interpolation.
#[inline]
pub fn bilerp(image: &[f32], width: usize, height: usize, x: Lengthf32, y: Lengthf32) -> f32 {
    debug_assert_eq!(image.len(), width * height);
    let x0 = clamp(x.floor() as isize, 0, width  as isize - 2);
    let y0 = clamp(y.floor() as isize, 0, height as isize - 2);
    let u = x - x0 as f32;
    let v = y - y0 as f32;

    let base = y0 * width + x0;
    let v00 = image[base];
    let v01 = image[base + 1];
    let v10 = image[base + width];
    let v11 = image[base + width + 1];

    let v0 = u.mul_add(v01 - v00, v00);
    let v1 = u.mul_add(v11 - v10, v10);
    v.mul_add(v1 - v0, v0)
}

/// Spread `value` over the four pixels neighbouring `(x, y)` with the same
/// weights that `bilerp` would use to read them back: the adjoint of `bilerp`.
pub fn splat(image: &mut [f32], width: usize, height: usize, x: Lengthf32, y: Lengthf32, value: f32) {
    debug_assert_eq!(image.len(), width * height);
    let x0 = clamp(x.floor() as isize, 0, width  as isize - 2);
    let y0 = clamp(y.floor() as isize, 0, height as isize - 2);
    let u = x - x0 as f32;
    let v = y - y0 as f32;

    let base = y0 * width + x0;
    image[base            ] += value * (1.0 - u) * (1.0 - v);
    image[base + 1        ] += value *        u  * (1.0 - v);
    image[base + width    ] += value * (1.0 - u) *        v;
    image[base + width + 1] += value *        u  *        v;
}
