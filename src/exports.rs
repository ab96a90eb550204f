pub use crate::backproject::{Backprojector, Cpu};
#[cfg(feature = "gpu")]
pub use crate::backproject::Gpu;
pub use crate::error::{Error, Result};
pub use crate::fdk::{Backend, Feldkamp};
pub use crate::filter::{RampFilter, RampFilterStage};
pub use crate::geometry::{projection_angle, ConeBeam, Geometry, Projection};
pub use crate::index::{BoxDim_u, Index1_u, Index3_u};
pub use crate::volume::Volume;

pub use units::{Angle, Length, Ratio};
