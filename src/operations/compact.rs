use tracing::debug;

use crate::mesh::TaggedMesh;

/// Removes nodes that no element references and renumbers the elements.
///
/// Every reference above a removed node moves down by the number of removed
/// nodes below it. Running it on a compact mesh changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveDisconnectedNodes;

impl RemoveDisconnectedNodes {
    /// Creates a new `RemoveDisconnectedNodes` operation.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Executes the compaction in place, returning the number of removed nodes.
    pub fn execute(&self, mesh: &mut TaggedMesh) -> usize {
        compact_in_place(mesh)
    }
}

pub(crate) fn compact_in_place(mesh: &mut TaggedMesh) -> usize {
    let (nodes, elements) = mesh.parts_mut();

    let mut used = vec![false; nodes.len()];
    for e in elements.iter() {
        for &n in e.node_ids() {
            used[n] = true;
        }
    }

    // new_index[i] = i - (number of removed nodes below i)
    let mut new_index = vec![0usize; nodes.len()];
    let mut removed = 0;
    for (i, &u) in used.iter().enumerate() {
        if u {
            new_index[i] = i - removed;
        } else {
            removed += 1;
        }
    }
    if removed == 0 {
        return 0;
    }

    let mut i = 0;
    nodes.retain(|_| {
        let keep = used[i];
        i += 1;
        keep
    });
    for e in elements.iter_mut() {
        for n in e.node_ids_mut() {
            *n = new_index[*n];
        }
    }

    debug!(removed, remaining = nodes.len(), "removed disconnected nodes");
    removed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point3;
    use crate::mesh::{Element, NO_NODE};

    fn p(x: f64) -> Point3 {
        Point3::new(x, 0.0, 0.0)
    }

    fn mesh_with_gaps() -> TaggedMesh {
        // Nodes 0, 2 and 5 are unreferenced.
        let nodes = (0..8).map(|i| p(f64::from(i))).collect();
        TaggedMesh::new(
            nodes,
            vec![
                Element::triangle([1, 3, 4], 1005, 1005),
                Element::tetrahedron([1, 3, 6, 7], 5, 5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn removes_and_renumbers() {
        let mut mesh = mesh_with_gaps();
        let removed = RemoveDisconnectedNodes::new().execute(&mut mesh);
        assert_eq!(removed, 3);
        assert_eq!(mesh.nodes(), &[p(1.0), p(3.0), p(4.0), p(6.0), p(7.0)]);
        assert_eq!(mesh.elements()[0].nodes, [0, 1, 2, NO_NODE]);
        assert_eq!(mesh.elements()[1].nodes, [0, 1, 3, 4]);
        mesh.validate().unwrap();
    }

    #[test]
    fn idempotent() {
        let mut once = mesh_with_gaps();
        RemoveDisconnectedNodes::new().execute(&mut once);
        let mut twice = once.clone();
        assert_eq!(RemoveDisconnectedNodes::new().execute(&mut twice), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_element_table_drops_all_nodes() {
        let mut mesh = TaggedMesh::new(vec![p(0.0), p(1.0)], Vec::new()).unwrap();
        assert_eq!(RemoveDisconnectedNodes::new().execute(&mut mesh), 2);
        assert_eq!(mesh.node_count(), 0);
    }
}
