//! Minimum-area triangulation of closed polygons

use floatscale_core::Point3d;

/// Loops longer than this are fan-triangulated instead
pub const MAX_DYNAMIC_LOOP: usize = 128;

fn triangle_area(a: &Point3d, b: &Point3d, c: &Point3d) -> f64 {
    (b - a).cross(&(c - a)).norm() * 0.5
}

/// Triangulate a closed polygon, preserving its orientation.
///
/// Returns index triples into `points`. Polygons with fewer than three
/// points produce no triangles.
pub fn triangulate(points: &[Point3d]) -> Vec<[usize; 3]> {
    let n = points.len();
    match n {
        0..=2 => Vec::new(),
        3 => vec![[0, 1, 2]],
        _ if n > MAX_DYNAMIC_LOOP => fan(n),
        _ => min_area(points),
    }
}

fn fan(n: usize) -> Vec<[usize; 3]> {
    (1..n - 1).map(|i| [0, i, i + 1]).collect()
}

fn min_area(points: &[Point3d]) -> Vec<[usize; 3]> {
    let n = points.len();
    let mut cost = vec![0.0f64; n * n];
    let mut split = vec![0usize; n * n];

    for gap in 2..n {
        for i in 0..n - gap {
            let j = i + gap;
            let mut best = f64::INFINITY;
            let mut best_k = i + 1;
            for k in i + 1..j {
                let c = cost[i * n + k]
                    + cost[k * n + j]
                    + triangle_area(&points[i], &points[k], &points[j]);
                if c < best {
                    best = c;
                    best_k = k;
                }
            }
            cost[i * n + j] = best;
            split[i * n + j] = best_k;
        }
    }

    let mut triangles = Vec::with_capacity(n - 2);
    let mut stack = vec![(0, n - 1)];
    while let Some((i, j)) = stack.pop() {
        if j - i < 2 {
            continue;
        }
        let k = split[i * n + j];
        triangles.push([i, k, j]);
        stack.push((k, j));
        stack.push((i, k));
    }
    triangles
}
