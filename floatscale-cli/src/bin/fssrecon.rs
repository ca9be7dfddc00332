//! Floating scale surface reconstruction.
//!
//! Reads one or more PLY sample files with positions, normals and per-sample
//! scale (`value`) and writes the reconstructed mesh as PLY.

use anyhow::{bail, Context, Result};
use clap::Parser;
use floatscale_cli::{init_logging, parse_args, report};
use floatscale_core::PointSource;
use floatscale_io::{open_point_source, write_mesh};
use floatscale_reconstruction::{
    init_thread_pool, Interpolation, ReconstructionConfig, ReconstructionPipeline,
    ThreadPoolConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Reconstructs a surface from oriented samples with scale
#[derive(Parser, Debug)]
#[command(name = "fssrecon")]
#[command(about = "Floating scale surface reconstruction from PLY samples")]
struct Args {
    /// Input sample files followed by the output mesh file
    #[arg(required = true, num_args = 2.., value_name = "IN_PLY... OUT_PLY")]
    paths: Vec<PathBuf>,

    /// Multiply every sample scale by this factor
    #[arg(short = 's', long, default_value_t = 1.0)]
    scale_factor: f32,

    /// Refine every octree leaf this many extra levels (0 to 3)
    #[arg(short = 'r', long = "refine-octree", default_value_t = 0)]
    refine_octree: u8,

    /// Raise smaller sample scales to this value
    #[arg(long, default_value_t = 0.0)]
    min_scale: f32,

    /// Skip samples with a larger scale
    #[arg(long, default_value_t = f32::INFINITY)]
    max_scale: f32,

    /// Isovertex interpolation: linear, scaling, lsderiv or cubic
    #[arg(short = 'i', long, default_value_t = Interpolation::Cubic)]
    interpolation: Interpolation,

    /// Deepest octree level
    #[arg(long, default_value_t = 20)]
    max_depth: u8,

    /// Worker threads, all cores when omitted
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(args: Args) -> Result<()> {
    let Some((output, inputs)) = args.paths.split_last() else {
        bail!("expected at least one input and one output file");
    };

    let config = ReconstructionConfig::default()
        .with_scale_factor(args.scale_factor)
        .with_min_scale(args.min_scale)
        .with_max_scale(args.max_scale)
        .with_refine_levels(args.refine_octree)
        .with_interpolation(args.interpolation)
        .with_max_depth(args.max_depth);
    config.validate()?;

    let mut pool = ThreadPoolConfig::default();
    if let Some(threads) = args.threads {
        pool = pool.with_threads(threads);
    }
    init_thread_pool(pool)?;

    let sources = inputs
        .iter()
        .map(|path| {
            open_point_source(path).with_context(|| format!("Failed to open {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let sources: Vec<&dyn PointSource> = sources.iter().map(|s| s.as_ref()).collect();

    let pipeline = ReconstructionPipeline::new(config);
    let (mesh, stats) = pipeline
        .reconstruct(&sources)
        .context("Reconstruction failed")?;
    info!(
        "Samples: {} accepted of {}, octree: {} leaves, {} voxels",
        stats.ingest.samples_accepted,
        stats.ingest.records_seen,
        stats.octree.num_leaves,
        stats.octree.num_voxels
    );

    write_mesh(&mesh, output).with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Wrote {} vertices and {} faces to {}",
        mesh.vertex_count(),
        mesh.face_count(),
        output.display()
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

#[cfg(test)]
mod tests {
    use super::*;
    use floatscale_cli::usage_exit_code;

    fn rejected(args: &[&str]) -> i32 {
        usage_exit_code(&Args::try_parse_from(args).unwrap_err())
    }

    #[test]
    fn test_bad_options_are_invalid_configuration() {
        assert_eq!(rejected(&["fssrecon", "--interpolation", "spline", "a.ply", "b.ply"]), 3);
        assert_eq!(rejected(&["fssrecon", "-r", "300", "a.ply", "b.ply"]), 3);
        assert_eq!(rejected(&["fssrecon", "a.ply"]), 3);
    }

    #[test]
    fn test_options_parse() {
        let args = Args::try_parse_from([
            "fssrecon", "-r", "2", "-i", "lsderiv", "--max-scale", "4", "a.ply", "b.ply", "out.ply",
        ])
        .unwrap();
        assert_eq!(args.refine_octree, 2);
        assert_eq!(args.interpolation, Interpolation::LsDeriv);
        assert_eq!(args.max_scale, 4.0);
        assert_eq!(args.paths.len(), 3);
    }
}
