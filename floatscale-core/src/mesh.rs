//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// A triangle mesh with vertices, faces and optional per-vertex attributes.
///
/// Every attribute channel that is present holds exactly one entry per vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<Color3f>>,
    pub confidences: Option<Vec<f32>>,
    /// Per-vertex scale, written as the PLY `value` attribute
    pub values: Option<Vec<f32>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
            confidences: None,
            values: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            ..Self::new()
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<Color3f>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Set vertex confidences
    pub fn set_confidences(&mut self, confidences: Vec<f32>) {
        if confidences.len() == self.vertices.len() {
            self.confidences = Some(confidences);
        }
    }

    /// Set vertex values (scales)
    pub fn set_values(&mut self, values: Vec<f32>) {
        if values.len() == self.vertices.len() {
            self.values = Some(values);
        }
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Delete the vertices flagged in `delete_list` and every face that
    /// references one of them. Remaining faces are re-indexed.
    ///
    /// Returns the number of deleted vertices.
    pub fn delete_vertices_fix_faces(&mut self, delete_list: &[bool]) -> usize {
        assert_eq!(
            delete_list.len(),
            self.vertices.len(),
            "delete list must have one entry per vertex"
        );

        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut next = 0;
        for (old, &delete) in delete_list.iter().enumerate() {
            if !delete {
                remap[old] = next;
                next += 1;
            }
        }
        let deleted = self.vertices.len() - next;
        if deleted == 0 {
            return 0;
        }

        self.faces = self
            .faces
            .iter()
            .filter(|face| face.iter().all(|&v| !delete_list[v]))
            .map(|face| [remap[face[0]], remap[face[1]], remap[face[2]]])
            .collect();

        retain_flagged(&mut self.vertices, delete_list);
        if let Some(normals) = self.normals.as_mut() {
            retain_flagged(normals, delete_list);
        }
        if let Some(colors) = self.colors.as_mut() {
            retain_flagged(colors, delete_list);
        }
        if let Some(confidences) = self.confidences.as_mut() {
            retain_flagged(confidences, delete_list);
        }
        if let Some(values) = self.values.as_mut() {
            retain_flagged(values, delete_list);
        }

        deleted
    }

    /// Check face/vertex consistency and attribute lengths
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        for (i, face) in self.faces.iter().enumerate() {
            if face.iter().any(|&v| v >= n) {
                return Err(Error::InvalidData(format!(
                    "Face {} references a vertex out of range: {:?}",
                    i, face
                )));
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                return Err(Error::InvalidData(format!(
                    "Face {} references the same vertex twice: {:?}",
                    i, face
                )));
            }
        }

        let channels = [
            ("normals", self.normals.as_ref().map(Vec::len)),
            ("colors", self.colors.as_ref().map(Vec::len)),
            ("confidences", self.confidences.as_ref().map(Vec::len)),
            ("values", self.values.as_ref().map(Vec::len)),
        ];
        for (name, len) in channels {
            if let Some(len) = len {
                if len != n {
                    return Err(Error::InvalidData(format!(
                        "Attribute '{}' has {} entries for {} vertices",
                        name, len, n
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

fn retain_flagged<T>(items: &mut Vec<T>, delete_list: &[bool]) {
    let mut index = 0;
    items.retain(|_| {
        let keep = !delete_list[index];
        index += 1;
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> TriangleMesh {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        mesh.set_confidences(vec![1.0, 2.0, 3.0, 4.0]);
        mesh.set_values(vec![0.1, 0.2, 0.3, 0.4]);
        mesh
    }

    #[test]
    fn test_delete_vertices_fix_faces() {
        let mut mesh = quad();
        let deleted = mesh.delete_vertices_fix_faces(&[false, true, false, false]);
        assert_eq!(deleted, 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.confidences, Some(vec![1.0, 3.0, 4.0]));
        assert_eq!(mesh.values, Some(vec![0.1, 0.3, 0.4]));
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_delete_nothing() {
        let mut mesh = quad();
        assert_eq!(mesh.delete_vertices_fix_faces(&[false; 4]), 0);
        assert_eq!(mesh, quad());
    }

    #[test]
    fn test_validate_rejects_bad_faces() {
        let mut mesh = quad();
        mesh.faces.push([0, 0, 1]);
        assert!(mesh.validate().is_err());

        let mut mesh = quad();
        mesh.faces.push([0, 1, 9]);
        assert!(mesh.validate().is_err());

        let mut mesh = quad();
        mesh.confidences = Some(vec![1.0]);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_face_normals() {
        let normals = quad().calculate_face_normals();
        assert_eq!(normals.len(), 2);
        approx::assert_relative_eq!(normals[0], Vector3f::z(), epsilon = 1e-6);
    }
}
