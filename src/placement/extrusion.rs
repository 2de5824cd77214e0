use crate::error::{GeometryError, MeshError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};
use crate::mesh::tags::{electrode_contact, electrode_surface, electrode_volume, SCRATCH_SURFACE};
use crate::mesh::TaggedMesh;

/// Direction, length and layer count for extruding one mounted surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrusion {
    pub vector: Vector3,
    pub layers: usize,
}

impl Extrusion {
    /// Extrusion of `length` along `normal`, with `floor(layers_per_unit *
    /// length)` layers (at least one).
    ///
    /// The normal is flipped if needed so that its x component is
    /// non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ZeroVector`] for a zero normal.
    pub fn along(normal: &Vector3, length: f64, layers_per_unit: f64) -> Result<Self> {
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }
        let unit = if normal.x >= 0.0 { normal / len } else { -normal / len };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let layers = ((layers_per_unit * length).floor() as usize).max(1);
        Ok(Self {
            vector: unit * length,
            layers,
        })
    }
}

/// Outward normal of a mounted electrode next to its centre.
///
/// Takes the volume, surface and contact elements of `channel`, builds their
/// outer boundary and returns the node normal of the boundary node closest
/// to `centre`.
///
/// # Errors
///
/// Returns [`MeshError::EmptySelection`] if the channel has no elements and
/// [`GeometryError::Degenerate`] if no normal is defined there.
pub fn electrode_normal(mounted: &TaggedMesh, channel: usize, centre: &Point3) -> Result<Vector3> {
    let tags = [
        electrode_volume(channel),
        electrode_surface(channel),
        electrode_contact(channel),
    ];
    let electrode = mounted.crop(&tags);
    if electrode.is_empty() {
        return Err(MeshError::EmptySelection(tags.to_vec()).into());
    }

    let boundary = electrode.outer_surface(SCRATCH_SURFACE);
    let index = boundary.closest_node(centre).ok_or_else(|| {
        GeometryError::Degenerate(format!("electrode {channel} has no volume elements"))
    })?;
    let normal = boundary.node_normals()[index];
    if normal.norm() < TOLERANCE {
        return Err(GeometryError::Degenerate(format!("no normal on electrode {channel}")).into());
    }
    Ok(normal)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::mesh::Element;

    #[test]
    fn extrusion_is_sign_normalised() {
        let e = Extrusion::along(&Vector3::new(-3.0, 0.0, 4.0), 2.0, 5.0).unwrap();
        assert_relative_eq!(e.vector, Vector3::new(1.2, 0.0, -1.6), epsilon = 1e-12);
        assert_eq!(e.layers, 10);

        let short = Extrusion::along(&Vector3::y(), 0.1, 5.0).unwrap();
        assert_eq!(short.layers, 1);
        assert!(Extrusion::along(&Vector3::zeros(), 1.0, 5.0).is_err());
    }

    #[test]
    fn normal_of_flat_electrode() {
        // Thin slab on z = 0: two tets under the square [0,2]x[0,2].
        let nodes = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(1.0, 1.0, -0.1),
            Point3::new(1.0, 1.0, 0.1),
        ];
        let mounted = TaggedMesh::new(
            nodes,
            vec![
                Element::tetrahedron([0, 1, 2, 5], 503, 503),
                Element::tetrahedron([0, 2, 3, 5], 503, 503),
                Element::tetrahedron([0, 1, 2, 4], 7, 7),
            ],
        )
        .unwrap();

        let n = electrode_normal(&mounted, 3, &Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_relative_eq!(n, Vector3::z(), epsilon = 1e-12);
        assert!(electrode_normal(&mounted, 2, &Point3::origin()).is_err());
    }
}
