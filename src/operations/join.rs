use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use tracing::debug;

use crate::math::Point3;
use crate::mesh::{Element, TaggedMesh};

use super::compact_in_place;

/// Default coincidence distance for shared nodes.
pub const DEFAULT_JOIN_EPSILON: f64 = 1e-8;

/// Merges a second mesh into a base mesh, sharing coincident nodes.
///
/// A node of the second mesh is shared when the nearest base node lies within
/// `epsilon`; it is then replaced by that base node. All other nodes are
/// appended after the base nodes. Elements keep their order, base mesh first,
/// and the result is compacted.
#[derive(Debug, Clone, Copy)]
pub struct JoinAndConnect {
    epsilon: f64,
}

impl Default for JoinAndConnect {
    fn default() -> Self {
        Self::new(DEFAULT_JOIN_EPSILON)
    }
}

impl JoinAndConnect {
    /// Creates a new `JoinAndConnect` operation.
    #[must_use]
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Executes the join, returning the merged mesh.
    #[must_use]
    pub fn execute(&self, base: &TaggedMesh, other: &TaggedMesh) -> TaggedMesh {
        self.execute_counted(base, other).0
    }

    /// Like [`execute`](Self::execute), also returning the number of shared
    /// nodes.
    #[must_use]
    pub fn execute_counted(&self, base: &TaggedMesh, other: &TaggedMesh) -> (TaggedMesh, usize) {
        let mut nodes: Vec<Point3> = base.nodes().to_vec();
        let remap = self.remap_nodes(base, other, &mut nodes);
        let shared = other.node_count() - (nodes.len() - base.node_count());

        let mut elements: Vec<Element> = base.elements().to_vec();
        elements.extend(other.elements().iter().map(|e| {
            let mut e = *e;
            for n in e.node_ids_mut() {
                *n = remap[*n];
            }
            e
        }));

        let mut mesh = TaggedMesh::from_parts(nodes, elements);
        compact_in_place(&mut mesh);
        debug!(
            shared,
            nodes = mesh.node_count(),
            elements = mesh.element_count(),
            "joined meshes"
        );
        (mesh, shared)
    }

    fn remap_nodes(&self, base: &TaggedMesh, other: &TaggedMesh, nodes: &mut Vec<Point3>) -> Vec<usize> {
        let tree = node_index(base.nodes());
        let max_dist_sq = self.epsilon * self.epsilon;

        other
            .nodes()
            .iter()
            .map(|p| {
                if let Some(tree) = &tree {
                    let nearest = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
                    if nearest.distance <= max_dist_sq {
                        #[allow(clippy::cast_possible_truncation)]
                        return nearest.item as usize;
                    }
                }
                nodes.push(*p);
                nodes.len() - 1
            })
            .collect()
    }
}

/// Kd-tree over `points`, `None` when there are none.
///
/// The immutable tree accepts any number of points sharing a coordinate,
/// which planar surfaces produce.
pub(crate) fn node_index(points: &[Point3]) -> Option<ImmutableKdTree<f64, u64, 3, 32>> {
    if points.is_empty() {
        return None;
    }
    let coords: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
    Some(ImmutableKdTree::new_from_slice(&coords))
}
