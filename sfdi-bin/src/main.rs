// SPDX-License-Identifier: MPL-2.0

use sfdi_lib::calibration::CalibrationBuilder;
use sfdi_lib::config::ExperimentConfig;
use sfdi_lib::crop::Crop;
use sfdi_lib::frame::Frame;
use sfdi_lib::interop::{self, ToImage};
use sfdi_lib::reconstruct::Reconstructor;
use sfdi_lib::registry::Registry;
use sfdi_lib::repository::{ExperimentRepository, FileRepository};
use sfdi_lib::sequencer::CaptureSequencer;

use anyhow::Context;
use glob::glob;
use std::path::{Path, PathBuf};

mod replay;
use replay::{ReplayCamera, ReplayProjector, ReplayStage};

// Default values for some of the program arguments.
const DEFAULT_REPO: &str = "sfdi-repository";
const DEFAULT_OUT_DIR: &str = "out";

/// Entry point of the program.
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = parse_args().and_then(run) {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}

fn display_help() {
    eprintln!(
        r#"
sfdi

Fringe projection profilometry from recorded acquisitions.
Images are replayed in capture order: height, rotation, stripe count, phase.

USAGE:
    sfdi list [FLAGS...]
    sfdi calibrate --config experiment.json --name NAME [FLAGS...] IMAGE_FILES...
    sfdi reconstruct --name NAME [FLAGS...] IMAGE_FILES...
    sfdi delete --name NAME [FLAGS...]
    For example:
        sfdi calibrate --config exp.json --name bench_A 'ref/*.png'

FLAGS:
    --help                 # Print this message and exit
    --version              # Print version and exit
    --config file.json     # Experiment configuration (plan, heights, strategies)
    --name NAME            # Name of the calibration
    --repo dir/            # Experiment repository (default: {})
    --out-dir dir/         # Output directory to save height maps (default: {})
    --crop x1,y1,x2,y2     # Crop images into a restricted working area (use no space between coordinates)
                           # Reconstruction reuses the crop of the calibration by default
"#,
        DEFAULT_REPO, DEFAULT_OUT_DIR,
    )
}

#[derive(Debug)]
enum Command {
    List,
    Calibrate { config: PathBuf, name: String },
    Reconstruct { name: String },
    Delete { name: String },
}

#[derive(Debug)]
/// Type holding command line arguments.
struct Args {
    command: Command,
    repo: PathBuf,
    out_dir: PathBuf,
    crop: Option<Crop>,
    images_paths: Vec<PathBuf>,
}

/// Function parsing the command line arguments and returning an Args object or an error.
fn parse_args() -> anyhow::Result<Args> {
    let mut args = pico_args::Arguments::from_env();

    // Check if the --help or --version flags are present.
    if args.contains(["-h", "--help"]) {
        display_help();
        std::process::exit(0);
    } else if args.contains(["-v", "--version"]) {
        println!("{}", std::env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    let subcommand = args.subcommand()?;
    let command = match subcommand.as_deref() {
        Some("list") => Command::List,
        Some("calibrate") => Command::Calibrate {
            config: args.value_from_str("--config")?,
            name: args.value_from_str("--name")?,
        },
        Some("reconstruct") => Command::Reconstruct {
            name: args.value_from_str("--name")?,
        },
        Some("delete") => Command::Delete {
            name: args.value_from_str("--name")?,
        },
        Some(other) => anyhow::bail!("Unknown command \"{}\". Use --help.", other),
        None => anyhow::bail!("Missing command. Use --help to know how to use this tool."),
    };

    // Optional arguments.
    let repo = args
        .opt_value_from_str("--repo")?
        .unwrap_or_else(|| DEFAULT_REPO.into());
    let out_dir = args
        .opt_value_from_str("--out-dir")?
        .unwrap_or_else(|| DEFAULT_OUT_DIR.into());
    let crop = args.opt_value_from_fn("--crop", parse_crop)?;

    // Verify that images paths are correct.
    let free_args = args.free()?;
    let images_paths = absolute_file_paths(&free_args)?;

    Ok(Args {
        command,
        repo,
        out_dir,
        crop,
        images_paths,
    })
}

fn parse_crop(s: &str) -> Result<Crop, sfdi_lib::Error> {
    Crop::try_from(s.split(',').collect::<Vec<_>>())
}

/// Retrieve the absolute paths of all files matching the arguments.
fn absolute_file_paths(args: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut abs_paths = Vec::new();
    for path_glob in args {
        let mut paths = paths_from_glob(path_glob)?;
        abs_paths.append(&mut paths);
    }
    abs_paths
        .iter()
        .map(|p| p.canonicalize().with_context(|| format!("{}", p.display())))
        .collect()
}

/// Retrieve the paths of files matching the glob pattern.
fn paths_from_glob(p: &str) -> anyhow::Result<Vec<PathBuf>> {
    let paths = glob(p)?;
    Ok(paths.into_iter().filter_map(|x| x.ok()).collect())
}

/// Start actual program with command line arguments successfully parsed.
fn run(args: Args) -> anyhow::Result<()> {
    let mut repo = FileRepository::open(&args.repo)
        .with_context(|| format!("Opening repository {}", args.repo.display()))?;
    match &args.command {
        Command::List => {
            for name in repo.list()? {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Delete { name } => {
            repo.delete(name)?;
            log::info!("Deleted calibration \"{}\"", name);
            Ok(())
        }
        Command::Calibrate { config, name } => calibrate(&args, &mut repo, config, name),
        Command::Reconstruct { name } => reconstruct(&args, &repo, name),
    }
}

fn calibrate(
    args: &Args,
    repo: &mut FileRepository,
    config_path: &Path,
    name: &str,
) -> anyhow::Result<()> {
    let config = ExperimentConfig::from_path(config_path)
        .with_context(|| format!("Reading {}", config_path.display()))?;
    let registry = Registry::default();
    let set = config.strategies(&registry)?;
    let strategies = set.strategies();

    // Fail before loading any image.
    let crop = args.crop.or(config.crop);
    let mut builder = CalibrationBuilder::new(repo).with_crop(crop);
    builder.preflight(name, strategies.profilometry, config.heights.is_some())?;

    let mut camera = ReplayCamera::load(&args.images_paths, crop, config.plan.multiplexed)?;
    let mut projector = ReplayProjector::new(config.plan.channels);
    let mut stage = config.heights.as_ref().map(ReplayStage::new);
    let mut sequencer = CaptureSequencer::new(&mut camera, &mut projector);
    if let Some(stage) = stage.as_mut() {
        sequencer = sequencer.with_stage(stage);
    }

    let now = std::time::Instant::now();
    let artifact = builder.calibrate(
        name,
        &config.plan,
        config.heights.as_ref(),
        &mut sequencer,
        &strategies,
    )?;
    drop(sequencer);
    eprintln!("Calibration took {:.1} s", now.elapsed().as_secs_f32());
    if camera.remaining() > 0 {
        log::warn!("{} recorded images were not used", camera.remaining());
    }
    log::info!(
        "Calibration \"{}\": {} model at resolution {:?}",
        artifact.name(),
        artifact.profilometry_model().strategy(),
        artifact.resolution()
    );
    Ok(())
}

fn reconstruct(args: &Args, repo: &FileRepository, name: &str) -> anyhow::Result<()> {
    let artifact = repo.load(name)?;
    let plan = artifact.pattern_plan();
    let crop = args.crop.or_else(|| artifact.crop());
    let mut camera = ReplayCamera::load(&args.images_paths, crop, plan.multiplexed)?;
    let mut projector = ReplayProjector::new(plan.channels);
    let tensor = CaptureSequencer::new(&mut camera, &mut projector).acquire(plan, None)?;

    let now = std::time::Instant::now();
    let registry = Registry::default();
    let heights = Reconstructor::new(&registry).reconstruct(&artifact, &tensor)?;
    eprintln!("Reconstruction took {:.1} s", now.elapsed().as_secs_f32());
    let min = heights.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = heights.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    log::info!("Heights in [{}, {}]", min, max);

    // Visualization of the height map.
    std::fs::create_dir_all(&args.out_dir)?;
    let path = args.out_dir.join(format!("{}_height.png", name));
    Frame::Gray(interop::normalized(&heights))
        .to_image()
        .save(&path)?;
    log::info!("Saved {}", path.display());
    Ok(())
}
