//! Errors which abort a reconstruction call.
//!
//! Contract violations (indexing a volume out of range, for example) are bugs
//! rather than runtime conditions, and panic instead of appearing here.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {

    #[error("unknown ramp filter `{0}` (expected `ram-lak` or `shepp-logan`)")]
    UnknownFilter(String),

    #[error("unknown backend `{0}` (expected `cpu` or `gpu`)")]
    UnknownBackend(String),

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("sinogram projections are {found:?} pixels, but the geometry describes a {expected:?} detector")]
    DetectorMismatch { found: [usize; 2], expected: [usize; 2] },

    #[error("sinogram contains no projections")]
    NoProjections,

    #[error("volume of size {size:?} needs {expected} elements, got {found}")]
    Shape { size: [usize; 3], expected: usize, found: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no `.{extension}` files found in {dir:?}")]
    EmptySequence { dir: PathBuf, extension: String },

    #[error("{path:?} holds {found} bytes, expected {expected}")]
    FrameSize { path: PathBuf, expected: usize, found: usize },

    #[error("{path:?} is a {found:?} image, expected {expected:?}")]
    FrameShape { path: PathBuf, expected: [usize; 2], found: [usize; 2] },

    #[error("cannot decode {path:?}: {source}")]
    Image { path: PathBuf, source: image::ImageError },

    #[error("GPU device error: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
