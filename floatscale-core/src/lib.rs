//! Core data structures and traits for floatscale
//!
//! This crate provides the fundamental types shared by the reconstruction
//! pipeline and its I/O layer: raw point records, scale-annotated samples,
//! point clouds, triangle meshes with per-vertex confidence, and the common
//! error type.

pub mod point;
pub mod sample;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use sample::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
