//! # Floatscale Reconstruction
//!
//! Floating scale surface reconstruction from oriented, scale-annotated
//! point samples.
//!
//! Samples are inserted into an adaptive octree at the depth matching their
//! scale. A signed implicit function is evaluated at every leaf corner from
//! compactly supported per-sample basis functions, and its zero level set is
//! extracted as a crack-free triangle mesh with per-vertex confidence.

pub mod ingest;
pub mod basis;
pub mod field;
pub mod octree;
pub mod interpolation;
pub mod triangulation;
pub mod iso_surface;
pub mod finalize;
pub mod parallel;
pub mod pipeline;

// Re-export commonly used items
pub use ingest::{ingest_record, IngestStats, Ingested, Ingestor, SampleOptions};
pub use field::{evaluate_field, FieldAccumulator, VoxelData};
pub use octree::{Cell, LatticeKey, Octree, OctreeStats};
pub use interpolation::{Crossing, EdgeSample, Interpolation};
pub use iso_surface::{extract_isosurface, EdgeKey, IsoSurfaceExtractor};
pub use finalize::{
    confidence_percentile, finalize_mesh, remove_low_confidence_vertices,
    remove_zero_confidence_vertices, strip_dummy_colors, FinalizeStats,
};
pub use parallel::{init_thread_pool, ThreadPoolConfig};
pub use pipeline::{reconstruct, ReconstructionConfig, ReconstructionPipeline, ReconstructionReport};
