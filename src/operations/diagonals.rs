use crate::error::{GeometryError, Result};
use crate::math::hull::planar_hull_vertices;
use crate::math::{lexicographic, Point3};

/// A segment between two far-apart footprint points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diagonal {
    pub start: Point3,
    pub end: Point3,
}

impl Diagonal {
    #[must_use]
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    #[must_use]
    pub fn midpoint(&self) -> Point3 {
        nalgebra::center(&self.start, &self.end)
    }
}

/// Finds the two longest diagonals of a planar footprint.
///
/// Only convex hull vertices are candidates. The farthest pair is taken, its
/// first point dropped from the candidates, and the farthest pair of the
/// remainder gives the second diagonal.
///
/// Candidates are sorted lexicographically by coordinates before the search
/// and the first strictly larger distance wins, so symmetric footprints
/// always produce the same pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct FindDiagonals;

impl FindDiagonals {
    /// Creates a new `FindDiagonals` operation.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Executes the search over the footprint `points`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DegenerateFootprint`] if fewer than two
    /// candidates are left for either diagonal.
    pub fn execute(&self, points: &[Point3]) -> Result<[Diagonal; 2]> {
        let mut candidates: Vec<Point3> = planar_hull_vertices(points)?
            .into_iter()
            .map(|i| points[i])
            .collect();
        candidates.sort_by(lexicographic);

        let first = farthest_pair(&candidates, 1)?;
        candidates.remove(first.0);
        let second = farthest_pair(&candidates, 2)?;

        Ok([first.1, second.1])
    }
}

/// Index of the first point and the diagonal of the farthest pair.
fn farthest_pair(points: &[Point3], diagonal: usize) -> Result<(usize, Diagonal)> {
    if points.len() < 2 {
        return Err(GeometryError::DegenerateFootprint {
            hull_points: points.len(),
            diagonal,
        }
        .into());
    }

    let mut best = (0, 1);
    let mut best_dist = f64::NEG_INFINITY;
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = (points[j] - points[i]).norm_squared();
            if d > best_dist {
                best_dist = d;
                best = (i, j);
            }
        }
    }

    Ok((
        best.0,
        Diagonal {
            start: points[best.0],
            end: points[best.1],
        },
    ))
}

/// The four diagonal endpoints, used as peripheral electrode anchors.
///
/// # Errors
///
/// Returns an error if the footprint is degenerate.
pub fn peripheral_anchors(points: &[Point3]) -> Result<[Point3; 4]> {
    let [a, b] = FindDiagonals::new().execute(points)?;
    Ok([a.start, a.end, b.start, b.end])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::error::PlannerError;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn rectangle(a: f64, b: f64) -> Vec<Point3> {
        vec![
            p(0.0, 0.0, 3.0),
            p(a, 0.0, 3.0),
            p(a, b, 3.0),
            p(0.0, b, 3.0),
        ]
    }

    #[test]
    fn rectangle_diagonals() {
        let [d1, d2] = FindDiagonals::new().execute(&rectangle(4.0, 3.0)).unwrap();
        assert_relative_eq!(d1.length(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(d2.length(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(d1.midpoint(), d2.midpoint(), epsilon = 1e-12);
        assert_relative_eq!(d1.midpoint(), p(2.0, 1.5, 3.0), epsilon = 1e-12);
        assert_ne!(d1, d2);
    }

    #[test]
    fn interior_points_are_ignored() {
        let mut pts = rectangle(6.0, 2.0);
        pts.push(p(3.0, 1.0, 3.0));
        pts.push(p(1.0, 1.5, 3.0));
        let anchors = peripheral_anchors(&pts).unwrap();
        for a in anchors {
            assert!(pts[..4].contains(&a));
        }
        let mut sorted = anchors.to_vec();
        sorted.sort_by(lexicographic);
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn square_tie_break_is_stable() {
        let mut pts = rectangle(2.0, 2.0);
        let [a, b] = FindDiagonals::new().execute(&pts).unwrap();
        pts.reverse();
        let [c, d] = FindDiagonals::new().execute(&pts).unwrap();
        assert_eq!((a, b), (c, d));
        assert_eq!(a.start, p(0.0, 0.0, 3.0));
        assert_eq!(a.end, p(2.0, 2.0, 3.0));
    }

    #[test]
    fn two_points_are_degenerate() {
        let err = FindDiagonals::new()
            .execute(&[p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Geometry(GeometryError::DegenerateFootprint {
                hull_points: 1,
                diagonal: 2
            })
        ));
    }
}
