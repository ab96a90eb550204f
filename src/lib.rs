//! Cone-beam CT reconstruction by Feldkamp-Davis-Kress filtered
//! backprojection.

mod exports;
pub use exports::*;

pub mod error;
pub mod index;
pub mod volume;
pub mod interpolate;
pub mod geometry;
pub mod filter;
pub mod backproject;
pub mod fdk;
pub mod sinogram;
pub mod phantom;
pub mod config;
pub mod io;
pub mod utils;
