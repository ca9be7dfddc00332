//! Confidence-based mesh cleaning.
//!
//! Removes low confidence vertices from a reconstructed PLY mesh and can
//! drop per-vertex attributes before writing.

use anyhow::{Context, Result};
use clap::Parser;
use floatscale_cli::{init_logging, parse_args, report};
use floatscale_core::Error;
use floatscale_io::{read_mesh, write_mesh};
use floatscale_reconstruction::{confidence_percentile, remove_low_confidence_vertices};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

/// Cleans a mesh by vertex confidence
#[derive(Parser, Debug)]
#[command(name = "meshclean")]
#[command(about = "Removes low confidence vertices from a PLY mesh")]
struct Args {
    /// Input mesh
    input: PathBuf,

    /// Output mesh
    output: PathBuf,

    /// Remove vertices with confidence at or below this value
    #[arg(short = 't', long, default_value_t = 1.0)]
    threshold: f32,

    /// Use the confidence at this percentile (0 to 100) as threshold
    #[arg(short = 'p', long, conflicts_with = "threshold")]
    percentile: Option<f32>,

    /// Drop the scale attribute
    #[arg(long)]
    delete_scale: bool,

    /// Drop the confidence attribute
    #[arg(long)]
    delete_conf: bool,

    /// Drop the color attribute
    #[arg(long)]
    delete_colors: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(args: Args) -> Result<()> {
    let mut mesh = read_mesh(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    info!(
        "Read {} vertices and {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );
    if mesh.confidences.is_none() {
        return Err(Error::InvalidData(format!(
            "{} has no confidence attribute",
            args.input.display()
        ))
        .into());
    }

    let threshold = match args.percentile {
        Some(percent) => {
            let value = confidence_percentile(&mesh, percent)?;
            info!("Confidence at the {} percentile: {}", percent, value);
            value
        }
        None => args.threshold,
    };

    let removed = remove_low_confidence_vertices(&mut mesh, threshold);
    info!("Removed {} vertices with confidence <= {}", removed, threshold);
    if mesh.is_empty() {
        warn!("No faces left after cleaning");
    }

    if args.delete_scale {
        mesh.values = None;
    }
    if args.delete_conf {
        mesh.confidences = None;
    }
    if args.delete_colors {
        mesh.colors = None;
    }

    write_mesh(&mesh, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(
        "Wrote {} vertices and {} faces to {}",
        mesh.vertex_count(),
        mesh.face_count(),
        args.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args: Args = match parse_args() {
        Ok(args) => args,
        Err(code) => return code,
    };
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(report(err) as u8),
    }
}
