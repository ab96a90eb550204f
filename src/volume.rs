//! Dense 3D volumes: sinograms, filtered projections and tomograms all live in
//! a `Volume`.
//!
//! The buffer is a single contiguous allocation with `x` varying fastest, then
//! `y`, then `z`. Bulk operations (`for_each`, `reduce` and friends) are
//! parallelized over `z`-planes: every plane is handled by exactly one rayon
//! job, so no synchronization is needed, and the per-plane partial results of
//! reductions are combined sequentially in plane order, which makes them
//! independent of the number of threads.

use ndarray::{ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3};
use num_traits::{Bounded, Float, Zero};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::index::{index3_to_1, in_bounds, BoxDim_u, Index1_u, Index3_u};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume<T> {
    size: BoxDim_u,
    data: Vec<T>,
}

impl<T: Zero + Clone> Volume<T> {

    /// Zero-filled volume with `size = [nx, ny, nz]`. Any of the dimensions
    /// may be zero, in which case nothing is allocated.
    pub fn new(size: BoxDim_u) -> Self {
        let [nx, ny, nz] = size;
        Self { size, data: vec![T::zero(); nx * ny * nz] }
    }

    /// Reallocate with new dimensions, discarding the previous contents: the
    /// result is zero-filled even if the size has not changed.
    pub fn resize(&mut self, size: BoxDim_u) {
        *self = Self::new(size);
    }
}

impl<T> Volume<T> {

    pub fn from_vec(size: BoxDim_u, data: Vec<T>) -> Result<Self> {
        let [nx, ny, nz] = size;
        let expected = nx * ny * nz;
        if data.len() != expected {
            return Err(Error::Shape { size, expected, found: data.len() });
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> BoxDim_u { self.size }

    pub fn len(&self) -> usize { self.data.len() }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn as_slice(&self) -> &[T] { &self.data }

    pub fn as_mut_slice(&mut self) -> &mut [T] { &mut self.data }

    pub fn into_vec(self) -> Vec<T> { self.data }

    /// Move the buffer out, leaving `self` with zero dimensions and no buffer.
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self { size: [0, 0, 0], data: Vec::new() })
    }

    /// Position of `index` in the flat buffer.
    ///
    /// # Panics
    /// If any component of `index` lies outside the volume.
    #[inline]
    pub fn offset(&self, index: Index3_u) -> Index1_u {
        assert!(in_bounds(index, self.size),
                "Volume index {index:?} out of bounds {:?}", self.size);
        index3_to_1(index, self.size)
    }

    #[inline]
    pub fn at(&self, index: Index3_u) -> &T { &self.data[self.offset(index)] }

    #[inline]
    pub fn at_mut(&mut self, index: Index3_u) -> &mut T {
        let i = self.offset(index);
        &mut self.data[i]
    }

    /// Number of elements in one `z`-plane.
    pub fn plane_len(&self) -> usize { self.size[0] * self.size[1] }

    /// The `z`-th plane as a flat, `x`-fastest slice.
    pub fn plane(&self, z: usize) -> &[T] {
        assert!(z < self.size[2], "Plane {z} out of bounds {:?}", self.size);
        let n = self.plane_len();
        &self.data[z * n .. (z + 1) * n]
    }

    pub fn plane_mut(&mut self, z: usize) -> &mut [T] {
        assert!(z < self.size[2], "Plane {z} out of bounds {:?}", self.size);
        let n = self.plane_len();
        &mut self.data[z * n .. (z + 1) * n]
    }

    /// The `z`-th plane with shape `[ny, nx]`, so that its rows run along `x`.
    pub fn plane_view(&self, z: usize) -> ArrayView2<'_, T> {
        let [nx, ny, _] = self.size;
        ArrayView2::from_shape((ny, nx), self.plane(z))
            .expect("plane length always matches its shape")
    }

    pub fn plane_view_mut(&mut self, z: usize) -> ArrayViewMut2<'_, T> {
        let [nx, ny, _] = self.size;
        ArrayViewMut2::from_shape((ny, nx), self.plane_mut(z))
            .expect("plane length always matches its shape")
    }

    /// The whole volume with shape `[nz, ny, nx]`.
    pub fn view(&self) -> ArrayView3<'_, T> {
        let [nx, ny, nz] = self.size;
        ArrayView3::from_shape((nz, ny, nx), &self.data)
            .expect("buffer length always matches the dimensions")
    }

    pub fn view_mut(&mut self) -> ArrayViewMut3<'_, T> {
        let [nx, ny, nz] = self.size;
        ArrayViewMut3::from_shape((nz, ny, nx), &mut self.data)
            .expect("buffer length always matches the dimensions")
    }

    /// All valid 3D indices, in buffer order.
    pub fn indices(&self) -> impl Iterator<Item = Index3_u> {
        let [nx, ny, nz] = self.size;
        itertools::iproduct!(0..nz, 0..ny, 0..nx).map(|(z, y, x)| [x, y, z])
    }
}

impl<T> core::ops::Index<Index3_u> for Volume<T> {
    type Output = T;
    #[inline]
    fn index(&self, i3: Index3_u) -> &Self::Output { self.at(i3) }
}

impl<T> core::ops::IndexMut<Index3_u> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, i3: Index3_u) -> &mut Self::Output { self.at_mut(i3) }
}

// ----- Parallel bulk operations ---------------------------------------------------------------
impl<T: Copy + Send + Sync> Volume<T> {

    /// Replace every element `v` with `f(v)`.
    pub fn for_each<F>(&mut self, f: F)
    where
        F: Fn(T) -> T + Sync + Send,
    {
        if self.is_empty() { return }
        let n = self.plane_len();
        self.data
            .par_chunks_mut(n)
            .for_each(|plane| for v in plane.iter_mut() { *v = f(*v) });
    }

    /// General reduction over all elements.
    ///
    /// `fold` accumulates one element (along with its 1D index) into a
    /// partial result; `combine` merges partial results. One partial result
    /// is computed per `z`-plane, starting from `identity`; the partials are
    /// then combined sequentially in plane order.
    pub fn fold_planes<A, F, C>(&self, identity: A, fold: F, combine: C) -> A
    where
        A: Clone + Send + Sync,
        F: Fn(A, Index1_u, T) -> A + Sync + Send,
        C: Fn(A, A) -> A,
    {
        if self.is_empty() { return identity }
        let n = self.plane_len();
        let partials: Vec<A> = self.data
            .par_chunks(n)
            .enumerate()
            .map(|(z, plane)| {
                plane.iter()
                    .enumerate()
                    .fold(identity.clone(), |acc, (i, &v)| fold(acc, z * n + i, v))
            })
            .collect();
        partials.into_iter().fold(identity, combine)
    }

    /// Fold all elements with `f`, which must be commutative and associative,
    /// with `identity` as its identity element.
    pub fn reduce<F>(&self, identity: T, f: F) -> T
    where
        F: Fn(T, T) -> T + Sync + Send,
    {
        self.fold_planes(identity, |acc, _, v| f(acc, v), &f)
    }
}

impl<T: Copy + Send + Sync + PartialOrd> Volume<T> {

    /// Smallest and largest element, in a single pass. `None` if empty.
    pub fn min_max(&self) -> Option<(T, T)>
    where
        T: Bounded,
    {
        if self.is_empty() { return None }
        let pick = |(lo, hi): (T, T), v: T| {
            (if v < lo { v } else { lo },
             if v > hi { v } else { hi })
        };
        Some(self.fold_planes(
            (T::max_value(), T::min_value()),
            |acc, _, v| pick(acc, v),
            |acc, (lo, hi)| pick(pick(acc, lo), hi),
        ))
    }

    /// Index of the largest element; ties go to the earliest in buffer order.
    pub fn argmax(&self) -> Option<Index3_u> {
        let better = |a: Option<(Index1_u, T)>, b: Option<(Index1_u, T)>| match (a, b) {
            (Some((_, va)), Some((_, vb))) if vb > va => b,
            (None, b) => b,
            (a, _) => a,
        };
        self.fold_planes(None, |acc, i, v| better(acc, Some((i, v))), better)
            .map(|(i, _)| crate::index::index1_to_3(i, self.size))
    }
}

impl<T: Float + Bounded + Send + Sync> Volume<T> {

    /// Rescale linearly so that the values span `[0, 1]`, returning the
    /// original range. A constant volume becomes all zeros.
    pub fn normalize(&mut self) -> Option<(T, T)> {
        let (lo, hi) = self.min_max()?;
        let range = hi - lo;
        if range > T::zero() { self.for_each(|v| (v - lo) / range) }
        else                 { self.for_each(|_| T::zero()) }
        Some((lo, hi))
    }

    /// Trilinear interpolation at fractional coordinates.
    ///
    /// The base cell is clamped to `[0, n-2]` in each dimension, so the
    /// neighbours read are always allocated. Dimensions of size 1 are not
    /// interpolated, which turns a single-plane volume into bilinear
    /// interpolation over 4 neighbours.
    ///
    /// # Panics
    /// If any coordinate lies outside `[0, n)`.
    pub fn sample(&self, [x, y, z]: [T; 3]) -> T {
        let [nx, ny, nz] = self.size;
        let (x0, x1, tx) = interpolation_cell(x, nx);
        let (y0, y1, ty) = interpolation_cell(y, ny);
        let (z0, z1, tz) = interpolation_cell(z, nz);
        let v = |x, y, z| self.data[index3_to_1([x, y, z], self.size)];
        let lerp = |a: T, b: T, t: T| a * (T::one() - t) + b * t;

        let c00 = lerp(v(x0, y0, z0), v(x1, y0, z0), tx);
        let c10 = lerp(v(x0, y1, z0), v(x1, y1, z0), tx);
        let c01 = lerp(v(x0, y0, z1), v(x1, y0, z1), tx);
        let c11 = lerp(v(x0, y1, z1), v(x1, y1, z1), tx);

        let c0 = lerp(c00, c10, ty);
        let c1 = lerp(c01, c11, ty);
        lerp(c0, c1, tz)
    }
}

/// Lower and upper neighbour along one axis, and the fractional position
/// between them.
fn interpolation_cell<T: Float>(c: T, n: usize) -> (usize, usize, T) {
    let upper = T::from(n).expect("volume dimension fits in a float");
    assert!(c >= T::zero() && c < upper, "Sample coordinate {:?} out of bounds [0, {n})", c.to_f64());
    if n == 1 { return (0, 0, T::zero()) }
    let base = c.floor().to_usize().unwrap_or(0).min(n - 2);
    let t = c - T::from(base).expect("index fits in a float");
    (base, base + 1, t)
}
