use std::collections::{BTreeSet, HashMap};

use crate::error::{MeshError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};
use crate::operations::compact_in_place;

use super::{Element, TaggedMesh};

impl TaggedMesh {
    /// Nodes referenced by elements whose `tag1` is `tag`.
    #[must_use]
    pub fn nodes_with_tag(&self, tag: i32) -> BTreeSet<usize> {
        self.elements()
            .iter()
            .filter(|e| e.tag1 == tag)
            .flat_map(|e| e.node_ids().iter().copied())
            .collect()
    }

    /// Number of elements carrying `tag` in either tag slot.
    #[must_use]
    pub fn count_elements_with_tag(&self, tag: i32) -> usize {
        self.elements().iter().filter(|e| e.has_tag(tag)).count()
    }

    /// New mesh with only the elements whose `tag1` is in `tags`, compacted.
    #[must_use]
    pub fn crop(&self, tags: &[i32]) -> TaggedMesh {
        self.filtered(|e| tags.contains(&e.tag1))
    }

    /// New mesh without the elements whose `tag1` is in `tags`, compacted.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::TagRetained`] if an element still carries one of
    /// the removed tags in its secondary slot.
    pub fn remove_tags(&self, tags: &[i32]) -> Result<TaggedMesh> {
        let mesh = self.filtered(|e| !tags.contains(&e.tag1));
        for &tag in tags {
            let count = mesh.count_elements_with_tag(tag);
            if count > 0 {
                return Err(MeshError::TagRetained { tag, count }.into());
            }
        }
        Ok(mesh)
    }

    fn filtered(&self, keep: impl Fn(&Element) -> bool) -> TaggedMesh {
        let elements = self.elements().iter().filter(|e| keep(e)).copied().collect();
        let mut mesh = TaggedMesh::from_parts(self.nodes().to_vec(), elements);
        compact_in_place(&mut mesh);
        mesh
    }

    /// Boundary of the tetrahedral part as an outward-oriented triangle mesh.
    ///
    /// A face is on the boundary when exactly one tetrahedron uses it. Every
    /// triangle gets `tag` in both slots.
    #[must_use]
    pub fn outer_surface(&self, tag: i32) -> TaggedMesh {
        let nodes = self.nodes();
        let mut order: Vec<[usize; 3]> = Vec::new();
        let mut faces: HashMap<[usize; 3], (usize, [usize; 3])> = HashMap::new();

        for tet in self.tetrahedra() {
            let [a, b, c, d] = tet.nodes;
            let volume = (nodes[b] - nodes[a])
                .cross(&(nodes[c] - nodes[a]))
                .dot(&(nodes[d] - nodes[a]));
            let mut oriented = [[a, c, b], [a, b, d], [a, d, c], [b, c, d]];
            if volume < 0.0 {
                for f in &mut oriented {
                    f.swap(1, 2);
                }
            }
            for face in oriented {
                let mut key = face;
                key.sort_unstable();
                let entry = faces.entry(key).or_insert_with(|| {
                    order.push(key);
                    (0, face)
                });
                entry.0 += 1;
            }
        }

        let elements = order
            .iter()
            .filter_map(|key| faces.get(key))
            .filter(|(count, _)| *count == 1)
            .map(|&(_, face)| Element::triangle(face, tag, tag))
            .collect();
        let mut surface = TaggedMesh::from_parts(nodes.to_vec(), elements);
        compact_in_place(&mut surface);
        surface
    }

    /// Area-weighted unit normals at every node, from the triangles.
    ///
    /// Nodes touched by no triangle (or by triangles cancelling out) get a
    /// zero vector.
    #[must_use]
    pub fn node_normals(&self) -> Vec<Vector3> {
        let nodes = self.nodes();
        let mut normals = vec![Vector3::zeros(); nodes.len()];
        for tri in self.triangles() {
            let [a, b, c, _] = tri.nodes;
            let n = (nodes[b] - nodes[a]).cross(&(nodes[c] - nodes[a]));
            for i in [a, b, c] {
                normals[i] += n;
            }
        }
        for n in &mut normals {
            let len = n.norm();
            if len > TOLERANCE {
                *n /= len;
            } else {
                *n = Vector3::zeros();
            }
        }
        normals
    }

    /// Index of the node closest to `point`, first one on ties.
    #[must_use]
    pub fn closest_node(&self, point: &Point3) -> Option<usize> {
        self.nodes()
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - point).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Number of nodes touched by both `tag_a` and `tag_b` elements.
    #[must_use]
    pub fn shared_node_count(&self, tag_a: i32, tag_b: i32) -> usize {
        let a = self.nodes_with_tag(tag_a);
        self.nodes_with_tag(tag_b).intersection(&a).count()
    }
}
