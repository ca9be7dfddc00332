//! Per-sample basis and weight functions
//!
//! Both are expressed in the sample frame: `u` is the signed distance along
//! the sample normal and `r` the distance from the normal axis, measured in
//! units of the sample scale.

use floatscale_core::{Point3d, Sample, Vector3d};
use std::f64::consts::PI;

/// Support radius of the weight function, in multiples of the scale
pub const SUPPORT: f64 = 3.0;

/// Distance beyond which a sample of scale 1 contributes nothing
pub const INFLUENCE_RADIUS: f64 = SUPPORT * std::f64::consts::SQRT_2;

/// Weight along the normal direction
pub fn weight_x(t: f64) -> f64 {
    if (-SUPPORT..0.0).contains(&t) {
        t * t / 9.0 + 2.0 * t / 3.0 + 1.0
    } else if (0.0..SUPPORT).contains(&t) {
        2.0 * t * t * t / 27.0 - t * t / 3.0 + 1.0
    } else {
        0.0
    }
}

pub fn weight_x_derivative(t: f64) -> f64 {
    if (-SUPPORT..0.0).contains(&t) {
        2.0 * t / 9.0 + 2.0 / 3.0
    } else if (0.0..SUPPORT).contains(&t) {
        2.0 * t * t / 9.0 - 2.0 * t / 3.0
    } else {
        0.0
    }
}

/// Weight orthogonal to the normal direction
pub fn weight_r(t: f64) -> f64 {
    if (0.0..SUPPORT).contains(&t) {
        2.0 * t * t * t / 27.0 - t * t / 3.0 + 1.0
    } else {
        0.0
    }
}

pub fn weight_r_derivative(t: f64) -> f64 {
    if (0.0..SUPPORT).contains(&t) {
        2.0 * t * t / 9.0 - 2.0 * t / 3.0
    } else {
        0.0
    }
}

/// Value, weight and their gradients of one sample at one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub value: f64,
    pub gradient: Vector3d,
    pub weight: f64,
    pub weight_gradient: Vector3d,
}

/// Evaluate a sample at `x`. Returns `None` outside the weight support.
pub fn evaluate(sample: &Sample, x: &Point3d) -> Option<Contribution> {
    let sigma = f64::from(sample.scale);
    let normal: Vector3d = sample.normal.cast::<f64>();
    let d = x - sample.position.cast::<f64>();

    let u = normal.dot(&d);
    let dist2 = d.norm_squared();
    let r = (dist2 - u * u).max(0.0).sqrt();

    let tx = u / sigma;
    let tr = r / sigma;
    let wx = weight_x(tx);
    let wr = weight_r(tr);
    let weight = wx * wr;
    if weight <= 0.0 {
        return None;
    }

    let sigma2 = sigma * sigma;
    // Normalized 3D Gaussian; the basis is its derivative along the normal.
    let gauss = (-dist2 / (2.0 * sigma2)).exp() / ((2.0 * PI).powf(1.5) * sigma2 * sigma);
    let value = u * gauss / sigma2;
    let gradient = (normal - d * (u / sigma2)) * (gauss / sigma2);

    let radial = if r > 0.0 {
        (d - normal * u) / r
    } else {
        Vector3d::zeros()
    };
    let weight_gradient = normal * (weight_x_derivative(tx) * wr / sigma)
        + radial * (wx * weight_r_derivative(tr) / sigma);

    Some(Contribution {
        value,
        gradient,
        weight,
        weight_gradient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use floatscale_core::{Point3f, Vector3f};

    fn unit_sample() -> Sample {
        Sample::new(Point3f::origin(), Vector3f::z(), 1.0)
    }

    #[test]
    fn test_weight_functions() {
        assert_relative_eq!(weight_x(0.0), 1.0);
        assert_relative_eq!(weight_x(-3.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(weight_x(2.999_999), 0.0, epsilon = 1e-6);
        assert_eq!(weight_x(3.0), 0.0);
        assert_eq!(weight_x(-3.5), 0.0);
        assert_relative_eq!(weight_r(0.0), 1.0);
        assert_eq!(weight_r(3.0), 0.0);
        // The weight favours the front of the sample.
        assert!(weight_x(0.5) > weight_x(-0.5));
    }

    #[test]
    fn test_weight_derivatives_match_finite_differences() {
        let h = 1e-6;
        for &t in &[-2.5, -1.0, -0.2, 0.3, 1.0, 2.5] {
            let numeric = (weight_x(t + h) - weight_x(t - h)) / (2.0 * h);
            assert_relative_eq!(weight_x_derivative(t), numeric, epsilon = 1e-6);
        }
        for &t in &[0.3, 1.0, 2.5] {
            let numeric = (weight_r(t + h) - weight_r(t - h)) / (2.0 * h);
            assert_relative_eq!(weight_r_derivative(t), numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_basis_sign() {
        let sample = unit_sample();
        let front = evaluate(&sample, &Point3d::new(0.0, 0.0, 0.5)).unwrap();
        let back = evaluate(&sample, &Point3d::new(0.0, 0.0, -0.5)).unwrap();
        let on = evaluate(&sample, &Point3d::new(0.4, 0.0, 0.0)).unwrap();
        assert!(front.value > 0.0);
        assert!(back.value < 0.0);
        assert_eq!(on.value, 0.0);
        assert!(evaluate(&sample, &Point3d::new(0.0, 0.0, 3.5)).is_none());
        assert!(evaluate(&sample, &Point3d::new(3.5, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let sample = Sample::new(
            Point3f::new(0.1, -0.2, 0.3),
            Vector3f::new(1.0, 2.0, 2.0).normalize(),
            0.8,
        );
        let x = Point3d::new(0.4, 0.1, 0.7);
        let c = evaluate(&sample, &x).unwrap();
        let h = 1e-6;
        for axis in 0..3 {
            let mut offset = Vector3d::zeros();
            offset[axis] = h;
            let plus = evaluate(&sample, &(x + offset)).unwrap();
            let minus = evaluate(&sample, &(x - offset)).unwrap();
            let value_fd = (plus.value - minus.value) / (2.0 * h);
            let weight_fd = (plus.weight - minus.weight) / (2.0 * h);
            assert_relative_eq!(c.gradient[axis], value_fd, epsilon = 1e-5);
            assert_relative_eq!(c.weight_gradient[axis], weight_fd, epsilon = 1e-5);
        }
    }
}
