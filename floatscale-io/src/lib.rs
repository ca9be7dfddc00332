//! I/O operations for sample clouds and meshes
//!
//! Samples are read from PLY files through [`PlySampleSource`], which the
//! reconstruction pipeline consumes as a restartable [`PointSource`].
//! Reconstructed meshes are written back to PLY with their confidence,
//! scale and color channels.

pub mod ply;

pub use ply::{PlyFormat, PlyReader, PlySampleSource, PlyWriteOptions, PlyWriter};

use floatscale_core::{Error, PointSource, Result, TriangleMesh};
use std::path::Path;

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// Auto-detect format and open a sample file as a point source
pub fn open_point_source<P: AsRef<Path>>(path: P) -> Result<Box<dyn PointSource>> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => Ok(Box::new(PlySampleSource::new(path))),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported sample format: {}",
            path.display()
        ))),
    }
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyReader::read_mesh(path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {}",
            path.display()
        ))),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyWriter::write_mesh(mesh, path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {}",
            path.display()
        ))),
    }
}
