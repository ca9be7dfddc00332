//! End-to-end floating scale reconstruction
//!
//! Sources are read twice: the first pass measures the accepted samples so
//! the octree root can be fixed before anything is inserted, the second pass
//! inserts them. The result does not depend on the order of the sources.

use crate::finalize::{finalize_mesh, FinalizeStats};
use crate::ingest::{IngestStats, Ingestor, SampleOptions};
use crate::interpolation::Interpolation;
use crate::iso_surface::extract_isosurface;
use crate::octree::{Octree, OctreeStats, DEFAULT_MAX_DEPTH, MAX_SUPPORTED_DEPTH};
use floatscale_core::{Error, Point3d, PointSource, Result, Sample, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Largest accepted number of extra refinement levels
pub const MAX_REFINE_LEVELS: u8 = 3;

/// Configuration of the reconstruction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub sample_options: SampleOptions,
    /// Extra levels every leaf is split after insertion
    pub refine_levels: u8,
    pub interpolation: Interpolation,
    pub max_depth: u8,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            sample_options: SampleOptions::default(),
            refine_levels: 0,
            interpolation: Interpolation::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ReconstructionConfig {
    pub fn with_sample_options(mut self, options: SampleOptions) -> Self {
        self.sample_options = options;
        self
    }

    pub fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.sample_options.scale_factor = scale_factor;
        self
    }

    pub fn with_min_scale(mut self, min_scale: f32) -> Self {
        self.sample_options.min_scale = min_scale;
        self
    }

    pub fn with_max_scale(mut self, max_scale: f32) -> Self {
        self.sample_options.max_scale = max_scale;
        self
    }

    pub fn with_refine_levels(mut self, levels: u8) -> Self {
        self.refine_levels = levels;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Reject unusable settings before any input is read
    pub fn validate(&self) -> Result<()> {
        if self.refine_levels > MAX_REFINE_LEVELS {
            return Err(Error::InvalidConfiguration(format!(
                "unreasonable refine level {}, expected 0 to {}",
                self.refine_levels, MAX_REFINE_LEVELS
            )));
        }
        if self.max_depth == 0 || self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(Error::InvalidConfiguration(format!(
                "maximum depth must be within 1 to {}, got {}",
                MAX_SUPPORTED_DEPTH, self.max_depth
            )));
        }
        self.sample_options.validate()
    }
}

/// Counters gathered over one reconstruction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionReport {
    pub ingest: IngestStats,
    pub octree: OctreeStats,
    /// Depth bound applied by the depth limit
    pub depth_limit: u8,
    pub extracted_vertices: usize,
    pub extracted_faces: usize,
    pub finalize: FinalizeStats,
    pub vertex_count: usize,
    pub face_count: usize,
    pub elapsed_ms: u128,
}

/// The floating scale reconstruction pipeline
#[derive(Debug, Clone, Default)]
pub struct ReconstructionPipeline {
    config: ReconstructionConfig,
}

impl ReconstructionPipeline {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Reconstruct a mesh from all sources
    pub fn reconstruct(
        &self,
        sources: &[&dyn PointSource],
    ) -> Result<(TriangleMesh, ReconstructionReport)> {
        self.config.validate()?;
        let start = Instant::now();
        let mut report = ReconstructionReport::default();

        let bounds = self.measure(sources, &mut report.ingest)?;
        let mut octree = self.build_octree(sources, &bounds)?;

        if self.config.refine_levels > 0 {
            info!("Refining octree by {} levels", self.config.refine_levels);
            octree.refine(self.config.refine_levels);
        }
        report.depth_limit = octree.limit_depth();
        info!("Octree: {}", octree.stats());
        debug!("Samples per depth: {:?}", octree.samples_per_depth());

        let voxel_start = Instant::now();
        octree.compute_voxels();
        octree.clear_samples();
        report.octree = octree.stats();
        info!(
            "Computed {} voxels in {} ms",
            octree.num_voxels(),
            voxel_start.elapsed().as_millis()
        );

        let mut mesh = extract_isosurface(&octree, self.config.interpolation)?;
        drop(octree);
        report.extracted_vertices = mesh.vertex_count();
        report.extracted_faces = mesh.face_count();

        report.finalize = finalize_mesh(&mut mesh);
        report.vertex_count = mesh.vertex_count();
        report.face_count = mesh.face_count();
        report.elapsed_ms = start.elapsed().as_millis();
        info!(
            "Reconstructed {} vertices and {} faces in {} ms",
            report.vertex_count, report.face_count, report.elapsed_ms
        );

        Ok((mesh, report))
    }

    /// First pass: ingestion statistics and the bounds of accepted samples
    fn measure(&self, sources: &[&dyn PointSource], stats: &mut IngestStats) -> Result<Bounds> {
        let mut bounds = Bounds::default();
        for source in sources {
            let mut ingestor = Ingestor::new(self.config.sample_options);
            for record in source.records()? {
                if let Some(sample) = ingestor.ingest(&record) {
                    bounds.add(&sample);
                }
            }
            let source_stats = ingestor.stats();
            info!(
                "{}: {} records, {} samples accepted",
                source.name(),
                source_stats.records_seen,
                source_stats.samples_accepted
            );
            if source_stats.malformed_skipped > 0 {
                warn!(
                    "{}: skipped {} malformed records",
                    source.name(),
                    source_stats.malformed_skipped
                );
            }
            if source_stats.scales_clamped > 0 || source_stats.rejected_max_scale > 0 {
                debug!(
                    "{}: {} scales clamped, {} samples above the maximum scale",
                    source.name(),
                    source_stats.scales_clamped,
                    source_stats.rejected_max_scale
                );
            }
            *stats += source_stats;
        }

        if stats.samples_accepted == 0 {
            return Err(Error::EmptyInput);
        }
        Ok(bounds)
    }

    /// Second pass: insert every accepted sample below a root fixed by the bounds
    fn build_octree(&self, sources: &[&dyn PointSource], bounds: &Bounds) -> Result<Octree> {
        let (center, size) = bounds.root().ok_or(Error::EmptyInput)?;
        debug!("Octree root at {} with size {}", center, size);
        let mut octree = Octree::with_root(center, size, self.config.max_depth);

        for source in sources {
            let mut ingestor = Ingestor::new(self.config.sample_options);
            for record in source.records()? {
                if let Some(sample) = ingestor.ingest(&record) {
                    octree.insert(sample);
                }
            }
        }
        if octree.num_samples() == 0 {
            return Err(Error::EmptyInput);
        }
        Ok(octree)
    }
}

/// Reconstruct with the given configuration
pub fn reconstruct(
    sources: &[&dyn PointSource],
    config: &ReconstructionConfig,
) -> Result<(TriangleMesh, ReconstructionReport)> {
    ReconstructionPipeline::new(config.clone()).reconstruct(sources)
}

/// Axis-aligned bounds and largest scale of the accepted samples
#[derive(Debug, Clone, Default)]
struct Bounds {
    extent: Option<(Point3d, Point3d)>,
    max_scale: f64,
}

impl Bounds {
    fn add(&mut self, sample: &Sample) {
        let p = sample.position.cast::<f64>();
        self.extent = Some(match self.extent {
            None => (p, p),
            Some((min, max)) => (min.inf(&p), max.sup(&p)),
        });
        self.max_scale = self.max_scale.max(f64::from(sample.scale));
    }

    /// Root center and size: the bounding cube, at least as large as the
    /// largest sample scale
    fn root(&self) -> Option<(Point3d, f64)> {
        let (min, max) = self.extent?;
        let center = nalgebra::center(&min, &max);
        let size = (max - min).max().max(self.max_scale);
        Some((center, size))
    }
}
