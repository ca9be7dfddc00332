//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// Linear RGB color with components nominally in `[0, 1]`.
///
/// A negative component marks a placeholder color that was never set.
pub type Color3f = [f32; 3];

/// Placeholder color used when no contributing sample carried a color
pub const DUMMY_COLOR: Color3f = [-1.0, -1.0, -1.0];

/// A raw point record as delivered by a point source.
///
/// Only the position is guaranteed; everything else depends on which
/// attributes the source provides. Turning a record into a [`crate::Sample`]
/// is the job of sample ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub position: Point3f,
    pub normal: Option<Vector3f>,
    /// Local sampling scale, stored as the `value` attribute in PLY files
    pub scale: Option<f32>,
    pub confidence: Option<f32>,
    pub color: Option<Color3f>,
}

impl PointRecord {
    /// Create a record with position, normal and scale
    pub fn new(position: Point3f, normal: Vector3f, scale: f32) -> Self {
        Self {
            position,
            normal: Some(normal),
            scale: Some(scale),
            confidence: None,
            color: None,
        }
    }

    /// Set the confidence of the record
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set the color of the record
    pub fn with_color(mut self, color: Color3f) -> Self {
        self.color = Some(color);
        self
    }
}

impl Default for PointRecord {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            normal: None,
            scale: None,
            confidence: None,
            color: None,
        }
    }
}
