mod element;
mod query;
pub mod tags;

pub use element::{Element, ElementKind, NO_NODE};

use crate::error::{MeshError, Result};
use crate::math::{Point3, Vector3};

/// A volumetric mesh whose elements carry material tags.
///
/// Node indices are 0-based. Elements are kept ordered with every triangle
/// before every tetrahedron; [`TaggedMesh::split_index`] is the boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaggedMesh {
    nodes: Vec<Point3>,
    elements: Vec<Element>,
}

impl TaggedMesh {
    /// Creates a mesh, checking node references and ordering triangles first.
    ///
    /// The relative order of elements of the same kind is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if an element references a node outside `nodes`.
    pub fn new(nodes: Vec<Point3>, elements: Vec<Element>) -> Result<Self> {
        let mut mesh = Self::from_parts(nodes, elements);
        mesh.validate()?;
        Ok(mesh)
    }

    /// Assembles a mesh without reference checks, only restoring the
    /// triangles-first order.
    pub(crate) fn from_parts(nodes: Vec<Point3>, mut elements: Vec<Element>) -> Self {
        // Stable, so per-kind order survives.
        elements.sort_by_key(|e| e.kind);
        Self { nodes, elements }
    }

    /// Checks that every element references existing nodes.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::DanglingNode`] for the first bad reference.
    pub fn validate(&self) -> Result<()> {
        let node_count = self.nodes.len();
        for (i, element) in self.elements.iter().enumerate() {
            if let Some(&node) = element.node_ids().iter().find(|&&n| n >= node_count) {
                return Err(MeshError::DanglingNode {
                    element: i,
                    node,
                    node_count,
                }
                .into());
            }
        }
        Ok(())
    }

    /// The node table.
    #[must_use]
    pub fn nodes(&self) -> &[Point3] {
        &self.nodes
    }

    /// Mutable node coordinates; the table length cannot change through this.
    pub fn nodes_mut(&mut self) -> &mut [Point3] {
        &mut self.nodes
    }

    /// The element table, triangles first.
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Consumes the mesh, returning its node and element tables.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Point3>, Vec<Element>) {
        (self.nodes, self.elements)
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Vec<Point3>, &mut Vec<Element>) {
        (&mut self.nodes, &mut self.elements)
    }

    /// Number of triangles, i.e. the index of the first tetrahedron.
    #[must_use]
    pub fn split_index(&self) -> usize {
        self.elements.partition_point(Element::is_triangle)
    }

    /// The triangle elements.
    #[must_use]
    pub fn triangles(&self) -> &[Element] {
        &self.elements[..self.split_index()]
    }

    /// The tetrahedron elements.
    #[must_use]
    pub fn tetrahedra(&self) -> &[Element] {
        &self.elements[self.split_index()..]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Overwrites `tag2` with `tag1` on every element.
    pub fn copy_tag1_to_tag2(&mut self) {
        for e in &mut self.elements {
            e.tag2 = e.tag1;
        }
    }

    /// Sets both tags of every element to `tag`.
    pub fn set_tags(&mut self, tag: i32) {
        for e in &mut self.elements {
            e.tag1 = tag;
            e.tag2 = tag;
        }
    }

    /// Moves every node by `offset`.
    pub fn translate(&mut self, offset: &Vector3) {
        for p in &mut self.nodes {
            *p += offset;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::error::PlannerError;

    /// Two tetrahedra sharing the face (1, 2, 3), with one surface triangle.
    pub(crate) fn two_tets(tag_a: i32, tag_b: i32) -> TaggedMesh {
        let nodes = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let elements = vec![
            Element::tetrahedron([0, 1, 2, 3], tag_a, tag_a),
            Element::tetrahedron([1, 2, 3, 4], tag_b, tag_b),
            Element::triangle([0, 1, 2], tag_a + 1000, tag_a + 1000),
        ];
        TaggedMesh::new(nodes, elements).unwrap()
    }

    #[test]
    fn triangles_are_moved_first() {
        let mesh = two_tets(5, 7);
        assert_eq!(mesh.split_index(), 1);
        assert!(mesh.elements()[0].is_triangle());
        assert_eq!(mesh.tetrahedra()[0].tag1, 5);
        assert_eq!(mesh.tetrahedra()[1].tag1, 7);
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let nodes = vec![Point3::origin(); 3];
        let err = TaggedMesh::new(nodes, vec![Element::triangle([0, 1, 3], 1, 1)]).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Mesh(MeshError::DanglingNode { node: 3, .. })
        ));
    }

    #[test]
    fn copy_and_set_tags() {
        let mut mesh = two_tets(5, 7);
        mesh.set_tags(9);
        assert!(mesh.elements().iter().all(|e| e.tag1 == 9 && e.tag2 == 9));
        let (nodes, mut elements) = mesh.into_parts();
        elements[0].tag2 = 1;
        let mut mesh = TaggedMesh::new(nodes, elements).unwrap();
        mesh.copy_tag1_to_tag2();
        assert!(mesh.elements().iter().all(|e| e.tag2 == 9));
    }
}
