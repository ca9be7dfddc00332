//! Implicit field aggregation
//!
//! The field at a point is the weighted mean of all sample basis functions
//! whose support reaches it:
//! `F(x) = Σ cᵢ wᵢ(x) fᵢ(x) / Σ cᵢ wᵢ(x)`.

use crate::basis;
use floatscale_core::{Color3f, Point3d, Sample, Vector3d, Vector3f, DUMMY_COLOR};
use serde::{Deserialize, Serialize};

/// Field data stored at one octree corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelData {
    pub value: f32,
    pub gradient: Vector3f,
    /// Sum of confidence-weighted basis weights
    pub confidence: f32,
    pub scale: f32,
    pub color: Color3f,
    /// Number of samples whose support reaches the voxel
    pub num_samples: u32,
}

impl VoxelData {
    /// A voxel no sample reaches with positive weight
    pub fn empty(num_samples: u32) -> Self {
        Self {
            value: 0.0,
            gradient: Vector3f::zeros(),
            confidence: 0.0,
            scale: 0.0,
            color: DUMMY_COLOR,
            num_samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.confidence <= 0.0
    }

    /// Inside the surface when the value is negative
    pub fn is_inside(&self) -> bool {
        self.value < 0.0
    }
}

/// Running sums for one evaluation point, kept in f64
#[derive(Debug, Clone)]
pub struct FieldAccumulator {
    position: Point3d,
    numerator: f64,
    denominator: f64,
    numerator_gradient: Vector3d,
    denominator_gradient: Vector3d,
    scale_sum: f64,
    color_sum: Vector3d,
    color_weight: f64,
    num_samples: u32,
}

impl FieldAccumulator {
    pub fn new(position: Point3d) -> Self {
        Self {
            position,
            numerator: 0.0,
            denominator: 0.0,
            numerator_gradient: Vector3d::zeros(),
            denominator_gradient: Vector3d::zeros(),
            scale_sum: 0.0,
            color_sum: Vector3d::zeros(),
            color_weight: 0.0,
            num_samples: 0,
        }
    }

    pub fn position(&self) -> &Point3d {
        &self.position
    }

    pub fn add(&mut self, sample: &Sample) {
        let Some(c) = basis::evaluate(sample, &self.position) else {
            return;
        };
        self.num_samples += 1;

        let confidence = f64::from(sample.confidence);
        let weight = confidence * c.weight;
        if weight <= 0.0 {
            return;
        }

        self.numerator += weight * c.value;
        self.denominator += weight;
        self.numerator_gradient +=
            (c.weight_gradient * c.value + c.gradient * c.weight) * confidence;
        self.denominator_gradient += c.weight_gradient * confidence;
        self.scale_sum += weight * f64::from(sample.scale);

        if let Some(color) = sample.color {
            let color = Vector3d::new(color[0].into(), color[1].into(), color[2].into());
            self.color_sum += color * weight;
            self.color_weight += weight;
        }
    }

    pub fn finish(self) -> VoxelData {
        if self.denominator <= 0.0 {
            return VoxelData::empty(self.num_samples);
        }

        let den = self.denominator;
        let value = self.numerator / den;
        // Quotient rule over the aggregated sums
        let gradient =
            (self.numerator_gradient * den - self.denominator_gradient * self.numerator) / (den * den);

        let color = if self.color_weight > 0.0 {
            let c = self.color_sum / self.color_weight;
            [c.x as f32, c.y as f32, c.z as f32]
        } else {
            DUMMY_COLOR
        };

        VoxelData {
            value: value as f32,
            gradient: gradient.cast::<f32>(),
            confidence: den as f32,
            scale: (self.scale_sum / den) as f32,
            color,
            num_samples: self.num_samples,
        }
    }
}

/// Evaluate the field at `x` from the given samples, in iteration order
pub fn evaluate_field<'a>(samples: impl IntoIterator<Item = &'a Sample>, x: Point3d) -> VoxelData {
    let mut acc = FieldAccumulator::new(x);
    for sample in samples {
        acc.add(sample);
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use floatscale_core::Point3f;

    #[test]
    fn test_empty_field() {
        let voxel = evaluate_field(&[], Point3d::origin());
        assert!(voxel.is_empty());
        assert_eq!(voxel, VoxelData::empty(0));
        assert!(!voxel.is_inside());
    }

    #[test]
    fn test_zero_confidence_sample_gives_empty_voxel() {
        let sample = Sample::new(Point3f::origin(), Vector3f::z(), 1.0).with_confidence(0.0);
        let voxel = evaluate_field(&[sample], Point3d::new(0.0, 0.0, 0.5));
        assert!(voxel.is_empty());
        assert_eq!(voxel.num_samples, 1);
        assert_eq!(voxel.color, DUMMY_COLOR);
    }

    #[test]
    fn test_single_sample_field() {
        let sample = Sample::new(Point3f::origin(), Vector3f::z(), 1.0)
            .with_confidence(2.0)
            .with_color([1.0, 0.5, 0.0]);
        let x = Point3d::new(0.0, 0.0, 0.5);
        let voxel = evaluate_field(&[sample], x);
        let c = basis::evaluate(&sample, &x).unwrap();

        assert_relative_eq!(voxel.value as f64, c.value, max_relative = 1e-6);
        assert_relative_eq!(voxel.confidence as f64, 2.0 * c.weight, max_relative = 1e-6);
        assert_eq!(voxel.scale, 1.0);
        assert_eq!(voxel.color, [1.0, 0.5, 0.0]);
        assert!(voxel.gradient.z > 0.0);
    }

    #[test]
    fn test_color_averages_only_colored_samples() {
        let colored = Sample::new(Point3f::origin(), Vector3f::z(), 1.0).with_color([1.0, 0.0, 0.0]);
        let plain = Sample::new(Point3f::new(0.1, 0.0, 0.0), Vector3f::z(), 2.0);
        let voxel = evaluate_field(&[colored, plain], Point3d::new(0.0, 0.0, 0.2));
        assert_eq!(voxel.color, [1.0, 0.0, 0.0]);
        assert!(voxel.scale > 1.0 && voxel.scale < 2.0);
        assert_eq!(voxel.num_samples, 2);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let samples = [
            Sample::new(Point3f::new(0.0, 0.0, 0.0), Vector3f::z(), 1.0),
            Sample::new(Point3f::new(0.5, 0.2, 0.1), Vector3f::new(0.0, 0.6, 0.8), 0.7)
                .with_confidence(0.5),
        ];
        let x = Point3d::new(0.2, 0.1, 0.3);
        let voxel = evaluate_field(&samples, x);

        let field = |p: Point3d| {
            let mut num = 0.0;
            let mut den = 0.0;
            for s in &samples {
                if let Some(c) = basis::evaluate(s, &p) {
                    num += f64::from(s.confidence) * c.weight * c.value;
                    den += f64::from(s.confidence) * c.weight;
                }
            }
            num / den
        };
        let h = 1e-6;
        for axis in 0..3 {
            let mut offset = Vector3d::zeros();
            offset[axis] = h;
            let fd = (field(x + offset) - field(x - offset)) / (2.0 * h);
            assert_relative_eq!(voxel.gradient[axis] as f64, fd, epsilon = 1e-4, max_relative = 1e-3);
        }
    }
}
