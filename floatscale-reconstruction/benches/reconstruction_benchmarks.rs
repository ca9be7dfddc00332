//! Benchmarks for the floating scale reconstruction stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use floatscale_core::{Point3d, Point3f, PointRecord, RecordCloud, Sample, Vector3f};
use floatscale_reconstruction::{
    extract_isosurface, reconstruct, Interpolation, Octree, ReconstructionConfig,
};

fn generate_sphere(rings: usize, scale: f32) -> Vec<PointRecord> {
    let mut records = Vec::with_capacity(rings * rings);
    for i in 0..rings {
        for j in 0..rings {
            let theta = std::f32::consts::PI * (i as f32 + 0.5) / rings as f32;
            let phi = std::f32::consts::TAU * j as f32 / rings as f32;
            let normal = Vector3f::new(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            );
            records.push(PointRecord::new(Point3f::from(normal), normal, scale));
        }
    }
    records
}

fn build_octree(records: &[PointRecord]) -> Octree {
    let mut octree = Octree::with_root(Point3d::origin(), 2.5, 20);
    for r in records {
        if let (Some(normal), Some(scale)) = (r.normal, r.scale) {
            octree.insert(Sample::new(r.position, normal, scale));
        }
    }
    octree
}

fn bench_voxels(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_voxels");

    for &rings in &[16, 32, 64] {
        let records = generate_sphere(rings, 4.0 / rings as f32);
        group.bench_with_input(
            BenchmarkId::from_parameter(records.len()),
            &records,
            |b, records| {
                b.iter(|| {
                    let mut octree = build_octree(records);
                    octree.compute_voxels();
                    black_box(octree.num_voxels());
                });
            },
        );
    }

    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_isosurface");

    let records = generate_sphere(48, 4.0 / 48.0);
    let mut octree = build_octree(&records);
    octree.compute_voxels();

    for mode in Interpolation::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &octree, |b, octree| {
            b.iter(|| {
                let mesh = extract_isosurface(black_box(octree), mode).unwrap();
                black_box(mesh);
            });
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct");
    group.sample_size(10);

    for &rings in &[24, 48] {
        let cloud = RecordCloud::from_points(generate_sphere(rings, 4.0 / rings as f32));
        for levels in [0u8, 1] {
            let config = ReconstructionConfig::default().with_refine_levels(levels);
            group.bench_with_input(
                BenchmarkId::new(format!("refine{}", levels), cloud.len()),
                &cloud,
                |b, cloud| {
                    b.iter(|| {
                        let result = reconstruct(&[cloud], &config).unwrap();
                        black_box(result);
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_voxels, bench_extraction, bench_pipeline);
criterion_main!(benches);
