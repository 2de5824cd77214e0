use tracing::debug;

use crate::error::{MeshError, Result};
use crate::mesh::tags::{SCRATCH_SURFACE, SCRATCH_VOLUME};
use crate::mesh::{TaggedMesh, tags::Tissue};

/// Rewrites one tag to another on every element, in both tag slots.
///
/// The rewrite is checked afterwards: the nodes touched by `new` must number
/// exactly as many as were touched by `old` before, and no element may keep
/// `old`. A failed check means conductivities would land on the wrong
/// elements, so it is reported as an error rather than logged.
pub struct Retag {
    old: i32,
    new: i32,
}

impl Retag {
    /// Creates a new `Retag` operation.
    #[must_use]
    pub fn new(old: i32, new: i32) -> Self {
        Self { old, new }
    }

    /// Executes the retag in place.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::RetagMismatch`] if the node counts differ and
    /// [`MeshError::TagRetained`] if the old tag survives.
    pub fn execute(&self, mesh: &mut TaggedMesh) -> Result<()> {
        let before = mesh.nodes_with_tag(self.old).len();

        let (_, elements) = mesh.parts_mut();
        for e in elements.iter_mut() {
            if e.tag1 == self.old {
                e.tag1 = self.new;
            }
            if e.tag2 == self.old {
                e.tag2 = self.new;
            }
        }

        let after = mesh.nodes_with_tag(self.new).len();
        if before != after {
            return Err(MeshError::RetagMismatch {
                old: self.old,
                new: self.new,
                before,
                after,
            }
            .into());
        }
        let count = mesh.count_elements_with_tag(self.old);
        if count > 0 {
            return Err(MeshError::TagRetained {
                tag: self.old,
                count,
            }
            .into());
        }

        debug!(old = self.old, new = self.new, nodes = after, "retagged");
        Ok(())
    }
}

/// Applies `(old, new)` retags in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first failing retag's error.
pub fn retag_all(mesh: &mut TaggedMesh, pairs: &[(i32, i32)]) -> Result<()> {
    for &(old, new) in pairs {
        Retag::new(old, new).execute(mesh)?;
    }
    Ok(())
}

/// Compact bone takes the skin tags, so the placement tool sees the skull as
/// the outermost layer.
///
/// # Errors
///
/// Returns an error if a retag check fails.
pub fn compact_bone_to_skin(mesh: &mut TaggedMesh) -> Result<()> {
    let bone = Tissue::CompactBone;
    let skin = Tissue::Skin;
    retag_all(
        mesh,
        &[
            (bone.surface_tag(), skin.surface_tag()),
            (bone.volume_tag(), skin.volume_tag()),
        ],
    )
}

/// Inverse of [`compact_bone_to_skin`].
///
/// # Errors
///
/// Returns an error if a retag check fails.
pub fn compact_bone_back(mesh: &mut TaggedMesh) -> Result<()> {
    let bone = Tissue::CompactBone;
    let skin = Tissue::Skin;
    retag_all(
        mesh,
        &[
            (skin.surface_tag(), bone.surface_tag()),
            (skin.volume_tag(), bone.volume_tag()),
        ],
    )
}

/// Exchanges the skin and compact bone tags through the scratch tags.
///
/// # Errors
///
/// Returns an error if a retag check fails, e.g. when a scratch tag is in use.
pub fn swap_skin_and_bone(mesh: &mut TaggedMesh) -> Result<()> {
    let bone = Tissue::CompactBone;
    let skin = Tissue::Skin;
    retag_all(
        mesh,
        &[
            (skin.surface_tag(), SCRATCH_SURFACE),
            (skin.volume_tag(), SCRATCH_VOLUME),
            (bone.surface_tag(), skin.surface_tag()),
            (bone.volume_tag(), skin.volume_tag()),
            (SCRATCH_SURFACE, bone.surface_tag()),
            (SCRATCH_VOLUME, bone.volume_tag()),
        ],
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::PlannerError;
    use crate::mesh::tests::two_tets;

    #[test]
    fn retag_moves_every_element() {
        let mut mesh = two_tets(5, 7);
        let before = mesh.nodes_with_tag(7).len();
        Retag::new(7, 8).execute(&mut mesh).unwrap();
        assert_eq!(mesh.count_elements_with_tag(7), 0);
        assert_eq!(mesh.nodes_with_tag(8).len(), before);
    }

    #[test]
    fn retag_rewrites_secondary_slot() {
        let (nodes, mut elements) = two_tets(5, 7).into_parts();
        elements[1].tag2 = 3;
        let mut mesh = TaggedMesh::new(nodes, elements).unwrap();
        Retag::new(3, 9).execute(&mut mesh).unwrap();
        assert_eq!(mesh.count_elements_with_tag(3), 0);
        assert_eq!(mesh.count_elements_with_tag(9), 1);
    }

    #[test]
    fn retag_onto_used_tag_fails() {
        let mut mesh = two_tets(5, 7);
        let err = Retag::new(7, 5).execute(&mut mesh).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Mesh(MeshError::RetagMismatch {
                before: 4,
                after: 5,
                ..
            })
        ));
    }

    #[test]
    fn retag_of_absent_tag_is_noop() {
        let mut mesh = two_tets(5, 7);
        let copy = mesh.clone();
        Retag::new(42, 43).execute(&mut mesh).unwrap();
        assert_eq!(mesh, copy);
    }

    #[test]
    fn every_tag_pair() {
        let base = two_tets(5, 7);
        let tags: Vec<i32> = vec![5, 7, 1005, 11];
        for &old in &tags {
            for new in [20, 21, 1020] {
                let mut mesh = base.clone();
                let before = mesh.nodes_with_tag(old).len();
                Retag::new(old, new).execute(&mut mesh).unwrap();
                assert_eq!(mesh.count_elements_with_tag(old), 0);
                assert_eq!(mesh.nodes_with_tag(new).len(), before);
            }
        }
    }

    #[test]
    fn bone_round_trip() {
        let mut mesh = two_tets(7, 2);
        compact_bone_to_skin(&mut mesh).unwrap();
        assert_eq!(mesh.count_elements_with_tag(5), 1);
        assert_eq!(mesh.count_elements_with_tag(1005), 1);
        compact_bone_back(&mut mesh).unwrap();
        assert_eq!(mesh, two_tets(7, 2));
    }

    #[test]
    fn swap_exchanges_tags() {
        let mut mesh = two_tets(5, 7);
        swap_skin_and_bone(&mut mesh).unwrap();
        assert_eq!(mesh.tetrahedra()[0].tag1, 7);
        assert_eq!(mesh.tetrahedra()[1].tag1, 5);
        assert_eq!(mesh.triangles()[0].tag1, 1007);
    }
}
