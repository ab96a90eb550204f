//! Read / write volumes as raw binary

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::index::BoxDim_u;
use crate::volume::Volume;

/// Element type of an exported volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VolumeType {
    #[default]
    F32,
    U16,
    U8,
}

impl VolumeType {
    pub fn bytes_per_voxel(self) -> usize {
        match self { Self::F32 => 4, Self::U16 => 2, Self::U8 => 1 }
    }
}

impl FromStr for VolumeType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float" => Ok(Self::F32),
            "u16"           => Ok(Self::U16),
            "u8"            => Ok(Self::U8),
            _ => Err(Error::Config(format!("unknown volume type `{s}` (expected f32, u16 or u8)"))),
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::F32 => "f32", Self::U16 => "u16", Self::U8 => "u8" })
    }
}

/// Write `volume` to `path`.
///
/// Integer types are always rescaled so that the volume's range fills the
/// type's range. `f32` is written as is, unless `normalize` asks for it to be
/// rescaled to `[0, 1]`.
pub fn write(volume: &Volume<f32>, path: &Path, kind: VolumeType, normalize: bool) -> Result<()> {
    let (lo, hi) = volume.min_max().unwrap_or((0.0, 0.0));
    let range = hi - lo;
    let unit = |v: f32| if range > 0.0 { (v - lo) / range } else { 0.0 };

    let mut out = BufWriter::new(File::create(path)?);
    let data = volume.as_slice();
    match kind {
        VolumeType::F32 if normalize => for &v in data { out.write_all(&unit(v).to_le_bytes())? },
        VolumeType::F32              => for &v in data { out.write_all(&v.to_le_bytes())? },
        VolumeType::U16 => for &v in data {
            out.write_all(&((unit(v) * u16::MAX as f32).round() as u16).to_le_bytes())?
        },
        VolumeType::U8  => for &v in data {
            out.write_all(&[(unit(v) * u8::MAX as f32).round() as u8])?
        },
    }
    out.flush()?;
    Ok(())
}

/// Read a raw `f32` volume of the given size.
pub fn read(path: &Path, size: BoxDim_u) -> Result<Volume<f32>> {
    let bytes = std::fs::read(path)?;
    let expected = size.iter().product::<usize>() * VolumeType::F32.bytes_per_voxel();
    if bytes.len() != expected {
        return Err(Error::FrameSize { path: path.into(), expected, found: bytes.len() });
    }
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Volume::from_vec(size, data)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn ramp() -> Volume<f32> {
        Volume::from_vec([3, 2, 1], vec![-1.0, 0.0, 1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    #[test]
    fn raw_io_roundtrip() -> Result<()> {
        // Harmless temporary location for output file
        let dir = tempdir()?;
        let file_path = dir.path().join("test.raw");

        let original = ramp();
        write(&original, &file_path, VolumeType::F32, false)?;
        let reloaded = read(&file_path, original.size())?;

        // Check that roundtrip didn't corrupt the data
        assert_eq!(original, reloaded);
        Ok(())
    }

    #[test]
    fn normalized_f32_spans_unit_interval() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.raw");
        write(&ramp(), &file_path, VolumeType::F32, true)?;
        let reloaded = read(&file_path, [3, 2, 1])?;
        assert_eq!(reloaded.as_slice(), &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);
        Ok(())
    }

    #[rstest(/**/ kind          , expected,
             case(VolumeType::U8 , vec![0, 51, 102, 153, 204, 255]),
             case(VolumeType::U16, [0_u16, 13107, 26214, 39321, 52428, 65535].iter()
                                   .flat_map(|v| v.to_le_bytes()).collect()),
    )]
    fn integer_types_fill_their_range(kind: VolumeType, expected: Vec<u8>) -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.raw");
        write(&ramp(), &file_path, kind, false)?;
        let bytes = std::fs::read(&file_path)?;
        assert_eq!(bytes.len(), 6 * kind.bytes_per_voxel());
        assert_eq!(bytes, expected);
        Ok(())
    }

    #[test]
    fn constant_volume_exports_as_zeros() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.raw");
        let constant = Volume::from_vec([2, 1, 1], vec![7.0, 7.0])?;
        write(&constant, &file_path, VolumeType::U8, false)?;
        assert_eq!(std::fs::read(&file_path)?, vec![0, 0]);
        Ok(())
    }

    #[test]
    fn read_checks_size() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.raw");
        write(&ramp(), &file_path, VolumeType::F32, false)?;
        assert!(matches!(read(&file_path, [2, 2, 2]), Err(Error::FrameSize { expected: 32, found: 24, .. })));
        Ok(())
    }

    #[test]
    fn parse_volume_types() {
        assert_eq!("u16".parse::<VolumeType>().unwrap(), VolumeType::U16);
        assert_eq!("F32".parse::<VolumeType>().unwrap(), VolumeType::F32);
        assert!("i32".parse::<VolumeType>().is_err());
    }
}
