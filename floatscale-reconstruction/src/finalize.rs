//! Mesh finalization and confidence-based cleanup

use floatscale_core::{Error, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What [`finalize_mesh`] removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeStats {
    pub ghost_vertices_removed: usize,
    pub colors_stripped: bool,
}

/// Remove ghost vertices and placeholder colors from an extracted mesh
pub fn finalize_mesh(mesh: &mut TriangleMesh) -> FinalizeStats {
    let ghost_vertices_removed = remove_zero_confidence_vertices(mesh);
    let colors_stripped = strip_dummy_colors(mesh);
    debug!(
        "Removed {} zero-confidence vertices{}",
        ghost_vertices_removed,
        if colors_stripped { ", dropped dummy colors" } else { "" }
    );
    FinalizeStats {
        ghost_vertices_removed,
        colors_stripped,
    }
}

/// Delete every vertex whose confidence is exactly zero
pub fn remove_zero_confidence_vertices(mesh: &mut TriangleMesh) -> usize {
    delete_where(mesh, |c| c == 0.0)
}

/// Delete every vertex whose confidence is at or below `threshold`
pub fn remove_low_confidence_vertices(mesh: &mut TriangleMesh, threshold: f32) -> usize {
    delete_where(mesh, |c| c <= threshold)
}

fn delete_where(mesh: &mut TriangleMesh, predicate: impl Fn(f32) -> bool) -> usize {
    let Some(confidences) = mesh.confidences.as_ref() else {
        return 0;
    };
    let delete_list: Vec<bool> = confidences.iter().map(|&c| predicate(c)).collect();
    mesh.delete_vertices_fix_faces(&delete_list)
}

/// Drop the color channel when it only holds the dummy color.
///
/// The first vertex decides: a negative component marks the channel as
/// placeholder data.
pub fn strip_dummy_colors(mesh: &mut TriangleMesh) -> bool {
    let is_dummy = mesh
        .colors
        .as_ref()
        .and_then(|colors| colors.first())
        .is_some_and(|c| c.iter().any(|&x| x < 0.0));
    if is_dummy {
        mesh.colors = None;
    }
    is_dummy
}

/// Confidence value below which `percent` percent of the vertices fall
pub fn confidence_percentile(mesh: &TriangleMesh, percent: f32) -> Result<f32> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(Error::InvalidConfiguration(format!(
            "percentile must be within [0, 100], got {}",
            percent
        )));
    }
    let mut confidences = match mesh.confidences.as_ref() {
        Some(c) if !c.is_empty() => c.clone(),
        _ => {
            return Err(Error::InvalidData(
                "mesh has no vertex confidences".to_string(),
            ))
        }
    };
    let n = ((percent / 100.0 * confidences.len() as f32) as usize).min(confidences.len() - 1);
    let (_, value, _) = confidences.select_nth_unstable_by(n, f32::total_cmp);
    Ok(*value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use floatscale_core::{Point3f, DUMMY_COLOR};

    /// Octahedron: six vertices, eight faces
    fn octahedron() -> TriangleMesh {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(-1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, -1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(0.0, 0.0, -1.0),
            ],
            vec![
                [0, 2, 4],
                [2, 1, 4],
                [1, 3, 4],
                [3, 0, 4],
                [2, 0, 5],
                [1, 2, 5],
                [3, 1, 5],
                [0, 3, 5],
            ],
        );
        mesh.set_confidences(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        mesh
    }

    #[test]
    fn test_zero_confidence_vertex_removed_with_faces() {
        let mut mesh = octahedron();
        mesh.confidences.as_mut().unwrap()[4] = 0.0;

        let stats = finalize_mesh(&mut mesh);
        assert_eq!(stats.ghost_vertices_removed, 1);
        assert!(!stats.colors_stripped);
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.face_count(), 4);
        assert!(mesh.confidences.as_ref().unwrap().iter().all(|&c| c > 0.0));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_low_confidence_threshold_is_inclusive() {
        let mut mesh = octahedron();
        assert_eq!(remove_low_confidence_vertices(&mut mesh, 2.0), 2);
        assert_eq!(mesh.confidences, Some(vec![3.0, 4.0, 5.0, 6.0]));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_dummy_colors_stripped() {
        let mut mesh = octahedron();
        mesh.set_colors(vec![DUMMY_COLOR; 6]);
        assert!(strip_dummy_colors(&mut mesh));
        assert!(mesh.colors.is_none());

        let mut mesh = octahedron();
        mesh.set_colors(vec![[0.5, 0.5, 0.5]; 6]);
        assert!(!strip_dummy_colors(&mut mesh));
        assert!(mesh.colors.is_some());
    }

    #[test]
    fn test_mesh_without_confidences_is_untouched() {
        let mut mesh = octahedron();
        mesh.confidences = None;
        assert_eq!(remove_zero_confidence_vertices(&mut mesh), 0);
        assert_eq!(mesh.vertex_count(), 6);
    }

    #[test]
    fn test_confidence_percentile() {
        let mesh = octahedron();
        assert_eq!(confidence_percentile(&mesh, 0.0).unwrap(), 1.0);
        assert_eq!(confidence_percentile(&mesh, 50.0).unwrap(), 4.0);
        assert_eq!(confidence_percentile(&mesh, 100.0).unwrap(), 6.0);
        assert!(confidence_percentile(&mesh, 150.0).is_err());
        assert!(confidence_percentile(&TriangleMesh::new(), 50.0).is_err());
    }
}
