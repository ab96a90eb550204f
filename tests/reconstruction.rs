//! End-to-end reconstruction of synthetic point sources.

use rstest::rstest;

use cbct::phantom::point_source;
use cbct::{Feldkamp, Geometry, Index3_u, RampFilter};
use units::mm;

/// Reconstruct a point source and return the brightest voxel of the tomogram.
fn reconstructed_peak(geometry: &Geometry, source: Index3_u, n_projections: usize, filter: RampFilter) -> Index3_u {
    let sinogram = point_source(geometry, source, n_projections);
    let tomogram = Feldkamp::cpu(filter).reconstruct(&sinogram, geometry).unwrap();
    assert_eq!(tomogram.size(), geometry.volume());
    assert!(tomogram.as_slice().iter().all(|v| v.is_finite()));
    tomogram.argmax().unwrap()
}

/// The brightest voxel lies within one voxel of the point source.
fn assert_point_recovered(geometry: &Geometry, source: Index3_u, n_projections: usize, filter: RampFilter) {
    let peak = reconstructed_peak(geometry, source, n_projections, filter);
    for (p, s) in peak.iter().zip(source) {
        assert!(p.abs_diff(s) <= 1, "brightest voxel {peak:?}, point source at {source:?}");
    }
}

// Same magnification and source distances as the full-size scan, a quarter
// of the resolution
fn reduced() -> Geometry {
    Geometry::new([128, 128], [mm(0.8), mm(0.8)], [32, 32, 32], mm(800.0), mm(1200.0)).unwrap()
}

#[rstest(/**/ source     , filter,
         case([16, 16, 16], RampFilter::SheppLogan),
         case([20, 12, 17], RampFilter::SheppLogan),
         case([ 6, 25, 10], RampFilter::SheppLogan),
         case([20, 12, 17], RampFilter::RamLak),
)]
fn point_source_reduced(source: Index3_u, filter: RampFilter) {
    assert_point_recovered(&reduced(), source, 90, filter);
}

fn full_size() -> Geometry {
    Geometry::new([512, 512], [mm(0.2), mm(0.2)], [128, 128, 128], mm(800.0), mm(1200.0)).unwrap()
}

// The full-size scan takes tens of seconds per case even at opt-level 3, so
// only the centred one runs by default. `cargo test -- --ignored` runs the rest.
#[test]
fn point_source_full_size_centred() {
    let source = [64, 64, 64];
    assert_eq!(reconstructed_peak(&full_size(), source, 360, RampFilter::SheppLogan), source);
}

#[rstest(source, case([80, 50, 70]), case([20, 110, 100]))]
#[ignore = "full-size scan: slow"]
fn point_source_full_size_off_centre(source: Index3_u) {
    assert_point_recovered(&full_size(), source, 360, RampFilter::SheppLogan);
}

#[test]
fn tomogram_survives_raw_export() -> cbct::Result<()> {
    use cbct::io::raw::{self, VolumeType};
    let geometry = reduced();
    let sinogram = point_source(&geometry, [10, 20, 15], 30);
    let tomogram = Feldkamp::cpu(RampFilter::SheppLogan).reconstruct(&sinogram, &geometry)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tomogram.raw");
    raw::write(&tomogram, &path, VolumeType::F32, false)?;
    let reloaded = raw::read(&path, geometry.volume())?;
    pretty_assertions::assert_eq!(tomogram, reloaded);
    Ok(())
}

#[cfg(feature = "gpu")]
#[test]
fn gpu_finds_the_same_point() {
    use cbct::Gpu;
    let Ok(gpu) = Gpu::new() else { return };
    let geometry = reduced();
    let source = [20, 12, 17];
    let sinogram = point_source(&geometry, source, 90);
    let cpu = Feldkamp::cpu(RampFilter::SheppLogan).reconstruct(&sinogram, &geometry).unwrap();
    let gpu = Feldkamp::new(RampFilter::SheppLogan, gpu).reconstruct(&sinogram, &geometry).unwrap();
    assert_eq!(gpu.argmax(), cpu.argmax());
}
