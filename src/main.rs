//! Face tracker over a directory of frames, with optional scripted detections.

use anyhow::{bail, Context, Result};
use clap::Parser;
use facetrack::config::{Config, EXAMPLE_CONFIG};
use facetrack::detection::{CandidateSource, NoCandidates, ScriptedCandidates};
use facetrack::session::{FrameReport, TrackingSession};
use facetrack::utils::image_conversion::YuvImage;
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of frame images, processed in lexical file name order
    #[arg(short, long, required_unless_present = "print_config")]
    frames: Option<PathBuf>,

    /// YAML script of detector boxes per frame index
    #[arg(short = 'c', long)]
    candidates: Option<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Write each frame with non-skin chroma washed out into this directory
    #[arg(long)]
    skin_map: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn frame_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading frame directory {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && image::ImageFormat::from_path(&path).is_ok() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn print_report(path: &Path, report: &FrameReport) {
    let g = report.geometry;
    let path_label = match report.path {
        Some(update) => format!("{update:?}"),
        None => "-".to_string(),
    };
    println!(
        "{:>6} {:<5} {:<5} x={:>7.1} y={:>7.1} r={:>6.1} dx={:>6.1} dy={:>6.1}{}  {}",
        report.frame_index,
        report.accepted,
        path_label,
        g.x,
        g.y,
        g.radius,
        g.dx,
        g.dy,
        if report.reset { " reset" } else { "" },
        path.display()
    );
}

fn write_skin_map(image: &YuvImage, session: &TrackingSession, dir: &Path, source: &Path) -> Result<()> {
    let mut scored = image.clone();
    session.face().skincolor().score_image(&mut scored.as_frame_mut()?);
    let name = source.file_stem().map_or_else(|| "frame".into(), |s| s.to_string_lossy().into_owned());
    scored.save(dir.join(format!("{name}.png")))?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match Config::from_file(path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Failed to load config file: {e}. Using defaults.");
                    Config::default()
                }
            }
        }
        None => Config::default(),
    };

    let mut source: Box<dyn CandidateSource> = match &args.candidates {
        Some(path) => Box::new(
            ScriptedCandidates::from_file(path)
                .with_context(|| format!("loading candidate script {}", path.display()))?,
        ),
        None => Box::new(NoCandidates),
    };

    let Some(dir) = args.frames else {
        bail!("--frames is required");
    };
    let paths = frame_paths(&dir)?;
    if paths.is_empty() {
        bail!("no readable images in {}", dir.display());
    }
    if let Some(out) = &args.skin_map {
        std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    }

    info!(
        "Tracking {} frames from {} with the {} candidate source",
        paths.len(),
        dir.display(),
        source.name()
    );

    let mut session = TrackingSession::new(&config)?;
    for path in &paths {
        let image = match YuvImage::open(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping unreadable frame {}: {e}", path.display());
                continue;
            }
        };
        let report = session.process(&image.as_frame()?, source.as_mut())?;
        print_report(path, &report);

        if let Some(out) = &args.skin_map {
            write_skin_map(&image, &session, out, path)?;
        }
    }

    let stats = session.statistics();
    println!(
        "frames={} accepted={} (haar={}, colour={}) resets={} hit_rate={:.3}",
        stats.frames,
        stats.accepted,
        stats.haar_accepted,
        stats.color_accepted,
        stats.resets,
        stats.hit_rate()
    );
    Ok(())
}
