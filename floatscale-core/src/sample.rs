//! Scale-annotated surface samples

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An oriented surface sample with a local scale.
///
/// Invariants once produced by ingestion: `normal` has unit length,
/// `scale > 0`, `confidence >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: Point3f,
    pub normal: Vector3f,
    pub scale: f32,
    pub confidence: f32,
    pub color: Option<Color3f>,
}

impl Sample {
    /// Create a sample with full confidence and no color
    pub fn new(position: Point3f, normal: Vector3f, scale: f32) -> Self {
        Self {
            position,
            normal,
            scale,
            confidence: 1.0,
            color: None,
        }
    }

    /// Set the confidence of the sample
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the color of the sample
    pub fn with_color(mut self, color: Color3f) -> Self {
        self.color = Some(color);
        self
    }

    /// Total order over all sample attributes.
    ///
    /// Field accumulation visits samples in this order so that the result does
    /// not depend on the order in which samples were inserted.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        let lhs = self.sort_key();
        let rhs = other.sort_key();
        lhs.iter()
            .zip(rhs.iter())
            .map(|(a, b)| a.total_cmp(b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn sort_key(&self) -> [f32; 11] {
        let color = self.color.unwrap_or(DUMMY_COLOR);
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.normal.x,
            self.normal.y,
            self.normal.z,
            self.scale,
            self.confidence,
            color[0],
            color[1],
            color[2],
        ]
    }
}
