//! Getting projections into, and tomograms out of, the process.
//!
//! Both formats are headerless little-endian rasters, `x` fastest: the size
//! has to come from configuration.

pub mod raw;
pub mod sequence;
