/// Sentinel stored in the unused fourth slot of a triangle.
pub const NO_NODE: usize = usize::MAX;

/// Element kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Triangle,
    Tetrahedron,
}

impl ElementKind {
    /// Number of node slots in use for this kind.
    #[must_use]
    pub fn node_count(self) -> usize {
        match self {
            Self::Triangle => 3,
            Self::Tetrahedron => 4,
        }
    }

    /// Gmsh element type number.
    #[must_use]
    pub fn gmsh_type(self) -> u32 {
        match self {
            Self::Triangle => 2,
            Self::Tetrahedron => 4,
        }
    }

    /// Kind for a Gmsh element type number, `None` for types the pipeline ignores.
    #[must_use]
    pub fn from_gmsh_type(ty: u32) -> Option<Self> {
        match ty {
            2 => Some(Self::Triangle),
            4 => Some(Self::Tetrahedron),
            _ => None,
        }
    }
}

/// A triangle or tetrahedron with its two tags.
///
/// Connectivity is stored in four slots so both kinds share one layout;
/// triangles keep [`NO_NODE`] in the last slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    pub nodes: [usize; 4],
    /// Material or region tag.
    pub tag1: i32,
    /// Secondary tag, usually a copy of `tag1`.
    pub tag2: i32,
}

impl Element {
    /// Creates a triangle.
    #[must_use]
    pub fn triangle(nodes: [usize; 3], tag1: i32, tag2: i32) -> Self {
        Self {
            kind: ElementKind::Triangle,
            nodes: [nodes[0], nodes[1], nodes[2], NO_NODE],
            tag1,
            tag2,
        }
    }

    /// Creates a tetrahedron.
    #[must_use]
    pub fn tetrahedron(nodes: [usize; 4], tag1: i32, tag2: i32) -> Self {
        Self {
            kind: ElementKind::Tetrahedron,
            nodes,
            tag1,
            tag2,
        }
    }

    /// The node slots in use.
    #[must_use]
    pub fn node_ids(&self) -> &[usize] {
        &self.nodes[..self.kind.node_count()]
    }

    /// Mutable access to the node slots in use.
    pub fn node_ids_mut(&mut self) -> &mut [usize] {
        let n = self.kind.node_count();
        &mut self.nodes[..n]
    }

    /// Whether either tag equals `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: i32) -> bool {
        self.tag1 == tag || self.tag2 == tag
    }

    /// Whether this is a triangle.
    #[must_use]
    pub fn is_triangle(&self) -> bool {
        self.kind == ElementKind::Triangle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_marks_unused_slot() {
        let t = Element::triangle([3, 4, 5], 1005, 1005);
        assert_eq!(t.nodes[3], NO_NODE);
        assert_eq!(t.node_ids(), &[3, 4, 5]);
    }

    #[test]
    fn gmsh_types() {
        assert_eq!(ElementKind::from_gmsh_type(2), Some(ElementKind::Triangle));
        assert_eq!(ElementKind::from_gmsh_type(4), Some(ElementKind::Tetrahedron));
        assert_eq!(ElementKind::from_gmsh_type(15), None);
        assert_eq!(ElementKind::Tetrahedron.gmsh_type(), 4);
    }

    #[test]
    fn has_tag_checks_both() {
        let t = Element::tetrahedron([0, 1, 2, 3], 5, 8);
        assert!(t.has_tag(5));
        assert!(t.has_tag(8));
        assert!(!t.has_tag(7));
    }
}
