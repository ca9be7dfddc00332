//! Zero-crossing interpolation along octree edges

use floatscale_core::{Error, Point3d, Vector3d};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strategy used to place the isosurface vertex on a sign-changing edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Root of the line through both values
    Linear,
    /// Linear on values multiplied by `scale^5`
    Scaling,
    /// Least-squares line through values and edge derivatives
    LsDeriv,
    /// Hermite cubic through values and edge derivatives
    #[default]
    Cubic,
}

impl FromStr for Interpolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "scaling" => Ok(Self::Scaling),
            "lsderiv" | "least-squares-derivative" => Ok(Self::LsDeriv),
            "cubic" => Ok(Self::Cubic),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown interpolation '{}', expected linear, scaling, lsderiv or cubic",
                other
            ))),
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linear => "linear",
            Self::Scaling => "scaling",
            Self::LsDeriv => "lsderiv",
            Self::Cubic => "cubic",
        };
        f.write_str(name)
    }
}

/// Field values at one end of an edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSample {
    pub position: Point3d,
    pub value: f64,
    pub gradient: Vector3d,
    pub scale: f64,
}

/// Computes the crossing parameter `t` in `[0, 1]` from the two edge ends
pub type CrossingFn = fn(&EdgeSample, &EdgeSample) -> f64;

/// A located zero crossing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub t: f64,
    pub position: Point3d,
    pub normal: Vector3d,
}

impl Interpolation {
    pub const ALL: [Interpolation; 4] = [
        Interpolation::Linear,
        Interpolation::Scaling,
        Interpolation::LsDeriv,
        Interpolation::Cubic,
    ];

    /// Select the crossing function once for the whole extraction
    pub fn resolve(self) -> CrossingFn {
        match self {
            Self::Linear => linear,
            Self::Scaling => scaling,
            Self::LsDeriv => least_squares_derivative,
            Self::Cubic => cubic,
        }
    }
}

/// Keep the parameter strictly inside the edge
fn open_unit(t: f64) -> f64 {
    t.clamp(f64::EPSILON, 1.0 - f64::EPSILON)
}

fn linear_root(v0: f64, v1: f64) -> f64 {
    if v0 == 0.0 {
        return 0.0;
    }
    if v1 == 0.0 {
        return 1.0;
    }
    open_unit(v0 / (v0 - v1))
}

/// Derivatives of the field along the edge, in units of the parameter
fn edge_derivatives(a: &EdgeSample, b: &EdgeSample) -> (f64, f64) {
    let edge = b.position - a.position;
    (a.gradient.dot(&edge), b.gradient.dot(&edge))
}

pub fn linear(a: &EdgeSample, b: &EdgeSample) -> f64 {
    linear_root(a.value, b.value)
}

pub fn scaling(a: &EdgeSample, b: &EdgeSample) -> f64 {
    let scaled = |s: &EdgeSample| {
        if s.scale > 0.0 {
            s.value * s.scale.powi(5)
        } else {
            s.value
        }
    };
    linear_root(scaled(a), scaled(b))
}

pub fn least_squares_derivative(a: &EdgeSample, b: &EdgeSample) -> f64 {
    let (v0, v1) = (a.value, b.value);
    if v0 == 0.0 || v1 == 0.0 {
        return linear_root(v0, v1);
    }
    let (d0, d1) = edge_derivatives(a, b);
    // Minimizes (l(0)-v0)² + (l(1)-v1)² + (l'-d0)² + (l'-d1)² for l(t) = a + bt
    let slope = (v1 - v0 + 2.0 * d0 + 2.0 * d1) / 5.0;
    let offset = (v0 + v1 - slope) / 2.0;
    let t = -offset / slope;
    if t.is_finite() && t > 0.0 && t < 1.0 {
        t
    } else {
        linear_root(v0, v1)
    }
}

pub fn cubic(a: &EdgeSample, b: &EdgeSample) -> f64 {
    let (v0, v1) = (a.value, b.value);
    if v0 == 0.0 {
        return 0.0;
    }
    if v1 == 0.0 {
        return 1.0;
    }
    let (d0, d1) = edge_derivatives(a, b);
    let hermite = |t: f64| {
        let t2 = t * t;
        let t3 = t2 * t;
        (2.0 * t3 - 3.0 * t2 + 1.0) * v0
            + (t3 - 2.0 * t2 + t) * d0
            + (-2.0 * t3 + 3.0 * t2) * v1
            + (t3 - t2) * d1
    };

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    let lo_negative = v0 < 0.0;
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        let value = hermite(mid);
        if value == 0.0 {
            return mid;
        }
        if (value < 0.0) == lo_negative {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    open_unit(0.5 * (lo + hi))
}

/// Locate the crossing between two edge ends with the resolved strategy
pub fn locate_crossing(crossing_fn: CrossingFn, a: &EdgeSample, b: &EdgeSample) -> Crossing {
    let t = crossing_fn(a, b);
    let edge = b.position - a.position;
    let position = a.position + edge * t;

    let blended = a.gradient * (1.0 - t) + b.gradient * t;
    let normal = blended
        .try_normalize(f64::MIN_POSITIVE)
        .or_else(|| edge.try_normalize(f64::MIN_POSITIVE))
        .unwrap_or_else(Vector3d::z);

    Crossing {
        t,
        position,
        normal,
    }
}
