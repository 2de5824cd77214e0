use crate::error::{GeometryError, Result};
use crate::math::rotation::rodrigues;
use crate::math::{Point3, Vector3, TOLERANCE};
use crate::mesh::TaggedMesh;

/// Local pad frame on the head surface.
///
/// `z_dir` is the surface normal at `centre` and `x_dir = z_dir x y_dir`,
/// which makes the frame left-handed with respect to the mesh coordinates.
/// All three directions are unit length and mutually orthogonal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectrodeFrame {
    pub centre: Point3,
    /// Index of `centre` in the surface mesh the frame was computed on.
    pub centre_index: usize,
    pub x_dir: Vector3,
    pub y_dir: Vector3,
    pub z_dir: Vector3,
}

/// Computes the [`ElectrodeFrame`] at the surface node nearest to a target.
///
/// The configured orientation is rotated about the normal by `theta` with
/// Rodrigues' formula and then projected into the tangent plane.
pub struct LocateFrame {
    target: Point3,
    orientation: Vector3,
    theta: f64,
}

impl LocateFrame {
    /// Creates a new `LocateFrame`; `theta_deg` is in degrees.
    #[must_use]
    pub fn new(target: Point3, orientation: Vector3, theta_deg: f64) -> Self {
        Self {
            target,
            orientation,
            theta: theta_deg.to_radians(),
        }
    }

    /// Executes the computation on a triangulated surface.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ZeroVector`] for a zero orientation,
    /// [`GeometryError::ParallelOrientation`] if the orientation is parallel
    /// to the surface normal, and [`GeometryError::Degenerate`] if the
    /// surface has no nodes or no normal at the nearest node.
    pub fn execute(&self, surface: &TaggedMesh) -> Result<ElectrodeFrame> {
        let y = self.orientation;
        if y.norm() < TOLERANCE {
            return Err(GeometryError::ZeroVector.into());
        }

        let centre_index = surface
            .closest_node(&self.target)
            .ok_or_else(|| GeometryError::Degenerate("surface has no nodes".to_owned()))?;
        let z = surface.node_normals()[centre_index];
        if z.norm() < TOLERANCE {
            return Err(GeometryError::Degenerate(format!(
                "no surface normal at node {centre_index}"
            ))
            .into());
        }

        if z.cross(&y).norm() < TOLERANCE * y.norm() {
            return Err(GeometryError::ParallelOrientation {
                orientation: [y.x, y.y, y.z],
                normal: [z.x, z.y, z.z],
            }
            .into());
        }

        let rotated = rodrigues(&y, &z, self.theta);
        let y_dir = (rotated - z * z.dot(&rotated)).normalize();
        let x_dir = z.cross(&y_dir);

        Ok(ElectrodeFrame {
            centre: surface.nodes()[centre_index],
            centre_index,
            x_dir,
            y_dir,
            z_dir: z,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::error::PlannerError;
    use crate::mesh::Element;

    /// Unit cube surface tagged 1005; the `x = 1` face is fanned around an
    /// extra node at its centre (index 8).
    pub(crate) fn cube_surface() -> TaggedMesh {
        let p = Point3::new;
        let nodes = vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
            p(0.0, 0.0, 1.0),
            p(1.0, 0.0, 1.0),
            p(1.0, 1.0, 1.0),
            p(0.0, 1.0, 1.0),
            p(1.0, 0.5, 0.5),
        ];
        let faces = [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [8, 1, 2],
            [8, 2, 6],
            [8, 6, 5],
            [8, 5, 1],
        ];
        let elements = faces
            .into_iter()
            .map(|f| Element::triangle(f, 1005, 1005))
            .collect();
        TaggedMesh::new(nodes, elements).unwrap()
    }

    #[test]
    fn frame_on_flat_face() {
        let frame = LocateFrame::new(Point3::new(1.5, 0.5, 0.5), Vector3::new(0.0, 0.0, 1.0), 0.0)
            .execute(&cube_surface())
            .unwrap();

        assert_eq!(frame.centre_index, 8);
        assert_eq!(frame.centre, Point3::new(1.0, 0.5, 0.5));
        assert_relative_eq!(frame.z_dir, Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(frame.y_dir, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(frame.x_dir, -Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(frame.x_dir.dot(&frame.y_dir), 0.0, epsilon = 1e-12);
        assert_relative_eq!(frame.x_dir.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(frame.y_dir.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn theta_rotates_about_normal() {
        let frame = LocateFrame::new(Point3::new(1.5, 0.5, 0.5), Vector3::new(0.0, 0.0, 100.0), 90.0)
            .execute(&cube_surface())
            .unwrap();
        assert_relative_eq!(frame.y_dir, -Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(frame.x_dir, -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn oblique_orientation_is_projected() {
        let frame = LocateFrame::new(Point3::new(1.5, 0.5, 0.5), Vector3::new(3.0, 0.0, 4.0), 0.0)
            .execute(&cube_surface())
            .unwrap();
        assert_relative_eq!(frame.y_dir, Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(frame.z_dir.dot(&frame.y_dir), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn orientation_parallel_to_normal_is_rejected() {
        let err = LocateFrame::new(Point3::new(1.5, 0.5, 0.5), Vector3::new(-2.0, 0.0, 0.0), 45.0)
            .execute(&cube_surface())
            .unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Geometry(GeometryError::ParallelOrientation { .. })
        ));
    }

    #[test]
    fn zero_orientation_and_empty_surface() {
        let target = Point3::origin();
        assert!(LocateFrame::new(target, Vector3::zeros(), 0.0)
            .execute(&cube_surface())
            .is_err());
        assert!(LocateFrame::new(target, Vector3::z(), 0.0)
            .execute(&TaggedMesh::default())
            .is_err());
    }
}
