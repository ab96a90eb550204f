/// Reconstruct a tomogram from a cone-beam CT scan

// ----------------------------------- CLI -----------------------------------
use clap::Parser;
use std::path::PathBuf;

use cbct::utils::parse_triplet;

#[derive(clap::Parser, Debug, Clone)]
#[command(name = "fdk", about = "Feldkamp-Davis-Kress cone-beam reconstruction")]
pub struct Cli {

    /// Reconstruction settings (.toml or .json)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Directory of projection frames [default: from config]
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Tomogram output file
    #[arg(short, long, default_value = "tomogram.raw")]
    pub output: PathBuf,

    /// Ramp filter: ram-lak or shepp-logan [default: from config]
    #[arg(long)]
    pub filter: Option<RampFilter>,

    /// Where to backproject: cpu or gpu [default: from config]
    #[arg(long)]
    pub backend: Option<Backend>,

    /// Number of voxels in each dimension [default: from config]
    #[arg(long, value_parser = parse_triplet::<usize>)]
    pub volume: Option<[usize; 3]>,

    /// Element type of the output file: f32, u16 or u8
    #[arg(long = "type", default_value = "f32")]
    pub volume_type: VolumeType,

    /// Rescale f32 output to [0, 1]
    #[arg(long)]
    pub normalize: bool,

    /// Maximum number of rayon threads [default: all cores]
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Reconstruct a synthetic point source at this voxel instead of reading input
    #[arg(long, value_parser = parse_triplet::<usize>)]
    pub phantom: Option<[usize; 3]>,

    /// Number of projections of the synthetic point source
    #[arg(long, default_value = "360")]
    pub projections: usize,
}
// --------------------------------------------------------------------------------

use std::error::Error;
use std::path::Path;

use cbct::config::{Config, Input};
use cbct::io::{raw::{self, VolumeType}, sequence};
use cbct::utils::{group_digits, timing::Progress};
use cbct::sinogram::{flat_field, to_attenuation};
use cbct::{phantom, Backend, Geometry, RampFilter, Volume};
use units::mm_;

fn main() -> Result<(), Box<dyn Error>> {

    let args = Cli::parse();

    if let Some(n) = args.threads {
        rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    }

    let mut progress = Progress::new();

    // --- Settings: config file, overridden by CLI ---------------------------------
    let mut config = Config::read(&args.config)?;
    if let Some(filter)  = args.filter  { config.filter  = filter  }
    if let Some(backend) = args.backend { config.backend = backend }
    if let Some(volume)  = args.volume  { config.volume  = volume  }
    let geometry = config.geometry()?;
    report_geometry(&config, &geometry);

    // --- Projections ---------------------------------------------------------------
    let sinogram = match args.phantom {
        Some(voxel) => {
            phantom::check_voxel(&geometry, voxel)?;
            progress.start(&format!("Projecting point source at {voxel:?} through {} angles", args.projections));
            let sinogram = phantom::point_source(&geometry, voxel, args.projections);
            progress.done();
            sinogram
        }
        None => {
            let input = config.input.clone().unwrap_or_else(|| Input {
                directory: None,
                extension: "raw".into(),
                reverse: false,
                free_ray: None,
                bright: None,
                dark: None,
            });
            let dir = args.input.clone().or_else(|| input.directory.clone())
                .ok_or("no input directory given, in config or with --input")?;
            read_projections(&dir, &input, &geometry, &mut progress)?
        }
    };
    println!("Sinogram: {:?} ({} projections)", sinogram.size(), group_digits(sinogram.size()[2]));

    // --- Reconstruction ------------------------------------------------------------
    println!("Reconstructing with {} filter on {}", config.filter, config.backend);
    let tomogram = config.backend.reconstruct(config.filter, &sinogram, &geometry, true)?;
    progress.done_with_message("Reconstructed");

    if let (Some((lo, hi)), Some(peak)) = (tomogram.min_max(), tomogram.argmax()) {
        println!("Tomogram range: [{lo}, {hi}], maximum at {peak:?}");
    }

    // --- Output --------------------------------------------------------------------
    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    progress.start(&format!("Writing {} {} tomogram to {}", tomogram.size().map(|n| n.to_string()).join("x"),
                            args.volume_type, args.output.display()));
    raw::write(&tomogram, &args.output, args.volume_type, args.normalize)?;
    progress.done();
    println!("Total: {}", progress.total());
    Ok(())
}

fn report_geometry(config: &Config, geometry: &Geometry) {
    let [w, h] = geometry.detector();
    let [px, py] = geometry.pixel_size().map(mm_);
    println!("Detector: {w} x {h} pixels of {px} x {py} mm");
    println!("SOD: {} mm, SDD: {} mm", mm_(config.sod), mm_(config.sdd));
    println!("Volume: {:?} voxels of {} mm", geometry.volume(), mm_(geometry.voxel_size()));
}

/// Import a directory of frames and turn counts into attenuation.
fn read_projections(dir: &Path, input: &Input, geometry: &Geometry, progress: &mut Progress) -> Result<Volume<f32>, Box<dyn Error>> {
    let detector = geometry.detector();
    if let Some(frame) = sequence::sequence_frame_size(dir, &input.extension)? {
        if frame != detector {
            return Err(format!("frames in {} are {frame:?} pixels, but the detector is {detector:?}", dir.display()).into());
        }
    }
    progress.start(&format!("Reading projections from {}", dir.display()));
    let mut sinogram = sequence::import(dir, &input.extension, detector, input.reverse)?;
    progress.done();

    let corrected = input.bright.is_some() || input.dark.is_some();
    if corrected {
        progress.start("Applying flat-field correction");
        let frame = |path: &Option<PathBuf>, fill: f32| match path {
            Some(path) => sequence::read_frame(path, detector),
            None       => Ok(vec![fill; detector[0] * detector[1]]),
        };
        let dark   = frame(&input.dark  , 0.0)?;
        let bright = match &input.bright {
            Some(_) => frame(&input.bright, 0.0)?,
            // Without an open-beam frame, the brightest pixel stands in for it
            None    => vec![sinogram.min_max().map_or(1.0, |(_, hi)| hi); detector[0] * detector[1]],
        };
        flat_field(&mut sinogram, &bright, &dark)?;
        progress.done();
    }

    let free_ray = match input.free_ray {
        Some(free_ray) => free_ray,
        None if corrected => 1.0,
        None => sinogram.min_max().map_or(1.0, |(_, hi)| hi),
    };
    progress.start(&format!("Converting to attenuation (free ray: {free_ray})"));
    to_attenuation(&mut sinogram, free_ray)?;
    progress.done();
    Ok(sinogram)
}
