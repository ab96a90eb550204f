//! Import a scan stored as a directory of projection frames.
//!
//! Frames are image files (16-bit greyscale TIFF, as written by flat-panel
//! detectors, or anything else the `image` crate decodes), or headerless
//! `.raw` blobs of little-endian `u16` counts, `u` fastest. Files are taken in
//! lexicographic order of their names, which must therefore sort in
//! acquisition order (zero-padded frame numbers).

use std::path::{Path, PathBuf};

use image::DynamicImage;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::volume::Volume;

/// The files in `dir` whose extension is `extension` (with or without a
/// leading dot), sorted by name.
pub fn list_frames(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let extension = extension.trim_start_matches('.');
    let mut files = vec![];
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_raw(path: &Path) -> bool {
    path.extension().map_or(false, |e| e.eq_ignore_ascii_case("raw"))
}

/// `[width, height]` of an image frame, read from its header. `None` for raw
/// frames, which do not record their size.
pub fn frame_size(path: &Path) -> Result<Option<[usize; 2]>> {
    if is_raw(path) { return Ok(None) }
    let (w, h) = image::image_dimensions(path)
        .map_err(|source| Error::Image { path: path.into(), source })?;
    Ok(Some([w as usize, h as usize]))
}

/// Size of the first frame of the sequence in `dir`, if it records one.
pub fn sequence_frame_size(dir: &Path, extension: &str) -> Result<Option<[usize; 2]>> {
    match list_frames(dir, extension)?.first() {
        Some(first) => frame_size(first),
        None => Err(Error::EmptySequence { dir: dir.into(), extension: extension.trim_start_matches('.').into() }),
    }
}

/// Read one `[width, height]` frame of detector counts as `f32`.
///
/// Greyscale images keep their stored values; colour images are reduced to
/// luminance in `[0, 1]`.
pub fn read_frame(path: &Path, detector: [usize; 2]) -> Result<Vec<f32>> {
    if is_raw(path) { read_raw_frame(path, detector) } else { read_image_frame(path, detector) }
}

fn read_raw_frame(path: &Path, [width, height]: [usize; 2]) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    let expected = width * height * std::mem::size_of::<u16>();
    if bytes.len() != expected {
        return Err(Error::FrameSize { path: path.into(), expected, found: bytes.len() });
    }
    Ok(bytes
       .chunks_exact(2)
       .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32)
       .collect())
}

fn read_image_frame(path: &Path, expected: [usize; 2]) -> Result<Vec<f32>> {
    let image = image::open(path).map_err(|source| Error::Image { path: path.into(), source })?;
    let found = [image.width() as usize, image.height() as usize];
    if found != expected {
        return Err(Error::FrameShape { path: path.into(), expected, found });
    }
    Ok(match image {
        DynamicImage::ImageLuma16(frame) => frame.into_raw().into_iter().map(f32::from).collect(),
        DynamicImage::ImageLuma8 (frame) => frame.into_raw().into_iter().map(f32::from).collect(),
        other => other.to_luma32f().into_raw(),
    })
}

/// Read every frame in `dir` into a sinogram of shape `[width, height, n]`.
///
/// With `reverse`, the last file becomes the first projection: use it for
/// scans which rotated the other way. Frames are read in parallel.
pub fn import(dir: &Path, extension: &str, detector: [usize; 2], reverse: bool) -> Result<Volume<f32>> {
    let files = list_frames(dir, extension)?;
    if files.is_empty() {
        return Err(Error::EmptySequence { dir: dir.into(), extension: extension.trim_start_matches('.').into() });
    }
    let n = files.len();
    let [w, h] = detector;
    let mut sinogram = Volume::new([w, h, n]);
    sinogram.as_mut_slice()
        .par_chunks_mut(w * h)
        .enumerate()
        .try_for_each(|(i, projection)| {
            let file = &files[if reverse { n - 1 - i } else { i }];
            projection.copy_from_slice(&read_frame(file, detector)?);
            Ok::<_, Error>(())
        })?;
    Ok(sinogram)
}
