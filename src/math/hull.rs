use std::collections::HashSet;

use nalgebra::Matrix3;
use spade::{DelaunayTriangulation, InsertionError, Point2 as SpadePoint2, Triangulation};

use crate::error::{GeometryError, Result};

use super::{Point3, Vector3, TOLERANCE};

/// Normal of the least-squares plane through `points`.
///
/// Eigenvector of the covariance matrix with the smallest eigenvalue.
/// Falls back to `+z` when the points carry no spread at all.
#[must_use]
pub fn best_fit_normal(points: &[Point3]) -> Vector3 {
    if points.is_empty() {
        return Vector3::z();
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;

    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }
    if cov.norm() < TOLERANCE {
        return Vector3::z();
    }

    let eigen = cov.symmetric_eigen();
    let smallest = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map_or(2, |(i, _)| i);
    let normal = eigen.eigenvectors.column(smallest).into_owned();
    let len = normal.norm();
    if len < TOLERANCE {
        Vector3::z()
    } else {
        normal / len
    }
}

/// Two unit vectors spanning the plane orthogonal to `normal`.
fn plane_basis(normal: &Vector3) -> (Vector3, Vector3) {
    let reference = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u_dir = normal.cross(&reference).normalize();
    let v_dir = normal.cross(&u_dir);
    (u_dir, v_dir)
}

/// Indices of the convex hull vertices of a (nearly) planar point set.
///
/// The points are projected onto their best-fit plane and triangulated; the
/// hull of the triangulation gives the vertices. Coincident projections
/// collapse onto the first point inserted. Indices are returned in hull order
/// without repetition.
///
/// # Errors
///
/// Returns an error if a projected point cannot be inserted (non-finite
/// coordinates).
pub fn planar_hull_vertices(points: &[Point3]) -> Result<Vec<usize>> {
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let normal = best_fit_normal(points);
    let (u_dir, v_dir) = plane_basis(&normal);
    let origin = points[0];

    let mut dt = DelaunayTriangulation::<SpadePoint2<f64>>::new();
    // Triangulation vertex index -> first source point inserted there.
    let mut source_of: Vec<usize> = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let d = p - origin;
        let handle = dt
            .insert(SpadePoint2::new(d.dot(&u_dir), d.dot(&v_dir)))
            .map_err(|e: InsertionError| {
                GeometryError::Degenerate(format!("hull insert of point {i}: {e}"))
            })?;
        if handle.index() == source_of.len() {
            source_of.push(i);
        }
    }

    if dt.num_vertices() == 1 {
        return Ok(vec![source_of[0]]);
    }
    if dt.all_vertices_on_line() {
        return Ok(segment_ends(points, &source_of));
    }

    let mut seen = HashSet::new();
    let mut hull = Vec::new();
    for edge in dt.convex_hull() {
        let vertex = edge.from().fix().index();
        if seen.insert(vertex) {
            hull.push(source_of[vertex]);
        }
    }
    Ok(hull)
}

/// The two extreme points of a collinear set.
fn segment_ends(points: &[Point3], distinct: &[usize]) -> Vec<usize> {
    let origin = points[distinct[0]];
    let dir = points[distinct[1]] - origin;
    let along = |i: &usize| (points[*i] - origin).dot(&dir);
    let lo = distinct.iter().min_by(|a, b| along(a).total_cmp(&along(b)));
    let hi = distinct.iter().max_by(|a, b| along(a).total_cmp(&along(b)));
    lo.into_iter().chain(hi).copied().collect()
}
