use std::collections::HashMap;

use kiddo::SquaredEuclidean;
use tracing::{debug, warn};

use crate::math::{round_point, Point3};
use crate::mesh::TaggedMesh;

use super::join::node_index;

/// Default snapping radius.
pub const DEFAULT_ALIGN_TOLERANCE: f64 = 0.1;
/// Default rounding applied to both node sets before matching.
pub const DEFAULT_ALIGN_DECIMALS: u32 = 4;

/// Snaps nodes of one mesh onto the nearby nodes of a reference mesh.
///
/// Both node sets are rounded to `decimals` places for the search. A node
/// whose nearest reference node is closer than `tolerance` gets that
/// reference node's exact (unrounded) coordinates; all other nodes are left
/// alone.
#[derive(Debug, Clone, Copy)]
pub struct AlignInterface {
    tolerance: f64,
    decimals: u32,
}

impl Default for AlignInterface {
    fn default() -> Self {
        Self::new(DEFAULT_ALIGN_TOLERANCE, DEFAULT_ALIGN_DECIMALS)
    }
}

impl AlignInterface {
    /// Creates a new `AlignInterface` operation.
    #[must_use]
    pub fn new(tolerance: f64, decimals: u32) -> Self {
        Self {
            tolerance,
            decimals,
        }
    }

    /// Executes the alignment in place, returning the number of moved nodes.
    pub fn execute(&self, to_fix: &mut TaggedMesh, reference: &TaggedMesh) -> usize {
        let rounded: Vec<Point3> = reference
            .nodes()
            .iter()
            .map(|p| round_point(p, self.decimals))
            .collect();
        let Some(tree) = node_index(&rounded) else {
            return 0;
        };
        let max_dist_sq = self.tolerance * self.tolerance;

        let mut claimed: HashMap<usize, usize> = HashMap::new();
        let mut moved = 0;
        for p in to_fix.nodes_mut() {
            let r = round_point(p, self.decimals);
            let nearest = tree.nearest_one::<SquaredEuclidean>(&[r.x, r.y, r.z]);
            if nearest.distance >= max_dist_sq {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let target = nearest.item as usize;
            *claimed.entry(target).or_default() += 1;
            let exact = reference.nodes()[target];
            if *p != exact {
                *p = exact;
                moved += 1;
            }
        }

        let merged = claimed.values().filter(|&&n| n > 1).count();
        if merged > 0 {
            warn!(
                merged,
                "several nodes snapped onto the same reference node"
            );
        }
        debug!(
            matched = claimed.values().sum::<usize>(),
            moved,
            tolerance = self.tolerance,
            "aligned interface"
        );
        moved
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use crate::mesh::Element;
    use crate::operations::join::tests::planar_patch;

    fn patch(points: Vec<Point3>) -> TaggedMesh {
        TaggedMesh::new(points, vec![Element::triangle([0, 1, 2], 1005, 1005)]).unwrap()
    }

    fn reference() -> TaggedMesh {
        patch(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.123_456_789, 10.0, 0.0),
        ])
    }

    #[test]
    fn close_nodes_take_exact_reference_coordinates() {
        let mut to_fix = patch(vec![
            Point3::new(0.03, -0.02, 0.01),
            Point3::new(10.0, 0.5, 0.0),
            Point3::new(0.1235, 10.0, 0.0),
        ]);
        let moved = AlignInterface::default().execute(&mut to_fix, &reference());

        assert_eq!(moved, 2);
        assert_eq!(to_fix.nodes()[0], Point3::origin());
        assert_eq!(to_fix.nodes()[1], Point3::new(10.0, 0.5, 0.0));
        assert_eq!(to_fix.nodes()[2], reference().nodes()[2]);
    }

    #[test]
    fn far_nodes_are_unchanged() {
        let original = patch(vec![
            Point3::new(5.0, 5.0, 5.0),
            Point3::new(-3.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.2),
        ]);
        let mut to_fix = original.clone();
        assert_eq!(AlignInterface::default().execute(&mut to_fix, &reference()), 0);
        assert_eq!(to_fix, original);
    }

    #[test]
    fn tolerance_is_configurable() {
        let mut to_fix = patch(vec![
            Point3::new(0.0, 0.0, 0.5),
            Point3::new(20.0, 0.0, 0.0),
            Point3::new(20.0, 20.0, 0.0),
        ]);
        AlignInterface::new(1.0, 4).execute(&mut to_fix, &reference());
        assert_eq!(to_fix.nodes()[0], Point3::origin());
    }

    #[test]
    fn empty_reference_moves_nothing() {
        let mut to_fix = reference();
        assert_eq!(
            AlignInterface::default().execute(&mut to_fix, &TaggedMesh::default()),
            0
        );
    }

    #[test]
    fn planar_interface_snaps_onto_reference() {
        let reference = planar_patch(8);
        let mut to_fix = reference.clone();
        to_fix.translate(&Vector3::new(0.02, 0.0, 0.0));
        // Apex stays away from the reference apex.
        let apex = to_fix.node_count() - 1;
        to_fix.nodes_mut()[apex] = Point3::new(-5.0, 0.5, 0.5);

        let moved = AlignInterface::default().execute(&mut to_fix, &reference);
        assert_eq!(moved, reference.node_count() - 1);
        assert_eq!(&to_fix.nodes()[..apex], &reference.nodes()[..apex]);
        assert_eq!(to_fix.nodes()[apex], Point3::new(-5.0, 0.5, 0.5));
    }
}
