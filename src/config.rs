//! Configuration file parser for FDK reconstruction
//!
//! TOML or JSON, chosen by the file's extension. Physical lengths are written
//! as strings carrying their unit, e.g. `sod = "800 mm"`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};

use units::Length;

use crate::error::{Error, Result};
use crate::fdk::Backend;
use crate::filter::RampFilter;
use crate::geometry::Geometry;

fn deserialize_uom<'d, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    String::deserialize(deserializer)?
        .parse::<T>()
        .map_err(de::Error::custom)
}

fn deserialize_uom_2d<'d, D, T>(deserializer: D) -> std::result::Result<[T; 2], D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let [x, y] = <[String; 2]>::deserialize(deserializer)?;
    Ok([
        x.parse().map_err(de::Error::custom)?,
        y.parse().map_err(de::Error::custom)?,
    ])
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Detector size in pixels: `[width, height]`
    pub detector: [usize; 2],

    /// Detector pixel pitch: `[horizontal, vertical]`
    #[serde(deserialize_with = "deserialize_uom_2d")]
    pub pixel_size: [Length; 2],

    /// Number of voxels in the reconstructed volume
    pub volume: [usize; 3],

    /// Source to rotation axis distance
    #[serde(deserialize_with = "deserialize_uom")]
    pub sod: Length,

    /// Source to detector distance
    #[serde(deserialize_with = "deserialize_uom")]
    pub sdd: Length,

    #[serde(default)]
    pub filter: RampFilter,

    #[serde(default)]
    pub backend: Backend,

    pub input: Option<Input>,
}

/// Where and how to find the measured projections.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Input {

    /// Directory holding one raw `u16` frame per projection, each the size of
    /// the detector
    pub directory: Option<PathBuf>,

    /// Only files with this extension are read
    #[serde(default = "default_extension")]
    pub extension: String,

    /// The frames were recorded while rotating in the opposite direction
    #[serde(default)]
    pub reverse: bool,

    /// Intensity recorded through air. Defaults to 1 when flat-field
    /// correction is used, otherwise to the maximum of the raw data.
    pub free_ray: Option<f32>,

    /// Open-beam calibration frame
    pub bright: Option<PathBuf>,

    /// No-beam calibration frame
    pub dark: Option<PathBuf>,
}

fn default_extension() -> String { "raw".into() }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format { Toml, Json }

impl Format {
    pub fn of(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(Error::Config(format!("cannot tell configuration format of `{}`: expected .toml or .json", path.display()))),
        }
    }
}

impl Config {

    pub fn parse(text: &str, format: Format) -> Result<Self> {
        match format {
            Format::Toml => toml::from_str(text).map_err(|e| Error::Config(e.to_string())),
            Format::Json => serde_json::from_str(text).map_err(|e| Error::Config(e.to_string())),
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let format = Format::of(path)?;
        let text = fs::read_to_string(path)?;
        Self::parse(&text, format).map_err(|e| match e {
            Error::Config(message) => Error::Config(format!("`{}`: {message}", path.display())),
            other => other,
        })
    }

    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::new(self.detector, self.pixel_size, self.volume, self.sod, self.sdd)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use units::mm_;

    fn assert_mm(length: Length, expected: f32) {
        assert_float_eq!(mm_(length), expected, r2nd <= 1e-6);
    }

    // ----- Test an example on-disk config file -----------------------------------------
    #[test]
    fn test_config_file() {
        let config = Config::read(Path::new("fdk-config.toml")).unwrap();
        assert_eq!(config.detector, [512, 512]);
        assert_mm(config.pixel_size[0], 0.2);
        assert_mm(config.pixel_size[1], 0.2);
        assert_eq!(config.volume, [128, 128, 128]);
        assert_mm(config.sod,  800.0);
        assert_mm(config.sdd, 1200.0);
        assert_eq!(config.filter, RampFilter::SheppLogan);
        assert_eq!(config.backend, Backend::Cpu);
        let input = config.input.unwrap();
        assert_eq!(input.extension, "raw");
        assert_eq!(input.free_ray, Some(6000.0));
        assert!(!input.reverse);
    }

    // ----- Some helpers to make the tests more concise ---------------------------------
    const MINIMAL: &str = r#"
        detector   = [64, 48]
        pixel_size = ["0.5 mm", "0.4 mm"]
        volume     = [32, 32, 16]
        sod        = "30 cm"
        sdd        = "450 mm"
    "#;

    fn toml(extra: &str) -> Result<Config> {
        Config::parse(&format!("{MINIMAL}\n{extra}"), Format::Toml)
    }

    // ----- Test deserializing of individual aspects of the Config type ----------------
    #[test]
    fn minimal_config_gets_defaults() {
        let config = toml("").unwrap();
        assert_eq!(config.detector, [64, 48]);
        assert_mm(config.pixel_size[0], 0.5);
        assert_mm(config.pixel_size[1], 0.4);
        assert_mm(config.sod, 300.0);
        assert_eq!(config.filter, RampFilter::SheppLogan);
        assert_eq!(config.backend, Backend::Cpu);
        assert_eq!(config.input, None);
        let g = config.geometry().unwrap();
        assert_eq!(g.volume(), [32, 32, 16]);
    }

    #[test]
    fn choose_filter_and_backend() {
        let config = toml(r#"
            filter  = "ram-lak"
            backend = "gpu"
        "#).unwrap();
        assert_eq!(config.filter, RampFilter::RamLak);
        assert_eq!(config.backend, Backend::Gpu);
    }

    #[test]
    fn input_table() {
        let config = toml(r#"
            [input]
            directory = "data/scan"
            reverse   = true
            bright    = "data/bright.raw"
        "#).unwrap();
        let input = config.input.unwrap();
        assert_eq!(input.directory, Some("data/scan".into()));
        assert_eq!(input.extension, "raw");
        assert!(input.reverse);
        assert_eq!(input.bright, Some("data/bright.raw".into()));
        assert_eq!(input.dark, None);
    }

    // ----- Errors are reported, never defaulted ----------------------------------------
    #[test]
    fn reject_unknown_filter() {
        let err = toml(r#"filter = "hann""#).unwrap_err();
        assert!(err.to_string().contains("hann"), "{err}");
    }

    #[test]
    fn reject_unknown_field() {
        assert!(matches!(toml("unknown_field = 666"), Err(Error::Config(_))));
    }

    #[test]
    fn reject_missing_field() {
        let text = MINIMAL.replace(r#"sod        = "30 cm""#, "");
        let err = Config::parse(&text, Format::Toml).unwrap_err();
        assert!(err.to_string().contains("sod"), "{err}");
    }

    #[test]
    fn reject_length_without_unit() {
        let text = MINIMAL.replace(r#""450 mm""#, r#""450""#);
        assert!(matches!(Config::parse(&text, Format::Toml), Err(Error::Config(_))));
    }

    // ----- JSON and file handling ------------------------------------------------------
    #[test]
    fn json_config() {
        let text = r#"{
            "detector":   [64, 48],
            "pixel_size": ["0.5 mm", "0.4 mm"],
            "volume":     [32, 32, 16],
            "sod":        "300 mm",
            "sdd":        "45 cm",
            "filter":     "RamLak",
            "input":      { "extension": "u16", "free_ray": 6000 }
        }"#;
        let json = Config::parse(text, Format::Json).unwrap();
        let toml = toml("").unwrap();
        assert_eq!(json.detector, toml.detector);
        assert_mm(json.sdd, 450.0);
        assert_eq!(json.filter, RampFilter::RamLak);
        assert_eq!(json.input.unwrap().extension, "u16");
    }

    #[test]
    fn format_is_chosen_by_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let toml_path = dir.path().join("scan.toml");
        fs::write(&toml_path, MINIMAL)?;
        assert_eq!(Config::read(&toml_path)?.volume, [32, 32, 16]);

        let ini_path = dir.path().join("scan.ini");
        fs::write(&ini_path, MINIMAL)?;
        assert!(matches!(Config::read(&ini_path), Err(Error::Config(_))));
        Ok(())
    }

    #[test]
    fn read_errors_name_the_file_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.toml");
        fs::write(&path, "detector = [512, 512]")?;
        let message = Config::read(&path).unwrap_err().to_string();
        assert!(message.contains("broken.toml"), "{message}");
        assert_eq!(message.matches("configuration error").count(), 1, "{message}");
        Ok(())
    }

    #[test]
    fn invalid_geometry_is_reported() {
        let text = MINIMAL.replace(r#""450 mm""#, r#""200 mm""#);
        let config = Config::parse(&text, Format::Toml).unwrap();
        assert!(matches!(config.geometry(), Err(Error::Geometry(_))));
    }
}
