//! Isolation pad outline.
//!
//! Outlines come from an [`OutlineSource`] as raw 2D points in arbitrary
//! units and are brought into the pad frame by [`normalize_outline`].

use std::path::{Path, PathBuf};

use crate::error::{GeometryError, MeshIoError, Result};
use crate::math::rotation::rotate_2d;
use crate::math::{round_to, Point2};

/// Supplier of the raw pad outline.
pub trait OutlineSource {
    /// Returns the outline vertices in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the outline cannot be produced.
    fn points(&self) -> Result<Vec<Point2>>;
}

/// Outline read from a text file with one `x y` (or `x,y`) pair per line.
///
/// Blank lines and lines starting with `#` are skipped.
#[derive(Debug, Clone)]
pub struct PointListOutline {
    path: PathBuf,
}

impl PointListOutline {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutlineSource for PointListOutline {
    fn points(&self) -> Result<Vec<Point2>> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MeshIoError::FileNotFound {
                path: self.path.clone(),
            },
            _ => MeshIoError::from(e),
        })?;
        parse_point_list(&text)
    }
}

/// Fixed outline, e.g. a square pad when no outline file is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticOutline(pub Vec<Point2>);

impl StaticOutline {
    /// Unit square, which normalises to a square pad.
    #[must_use]
    pub fn square() -> Self {
        Self(vec![
            Point2::new(-1.0, -1.0),
            Point2::new(1.0, -1.0),
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 1.0),
        ])
    }
}

impl OutlineSource for StaticOutline {
    fn points(&self) -> Result<Vec<Point2>> {
        Ok(self.0.clone())
    }
}

fn parse_point_list(text: &str) -> Result<Vec<Point2>> {
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();
        let [x, y] = values.as_slice() else {
            return Err(MeshIoError::invalid(i + 1, format!("expected two coordinates, got `{line}`")).into());
        };
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|e| MeshIoError::invalid(i + 1, format!("`{s}`: {e}")))
        };
        points.push(Point2::new(parse(*x)?, parse(*y)?));
    }
    Ok(points)
}

/// Fits raw outline points into `[-half_extent, half_extent]` on both axes.
///
/// The points are rounded to 2 decimals, centred on their bounding box,
/// rescaled per axis, rounded again, rotated by `rotation_deg` about the
/// origin and rounded a last time.
///
/// # Errors
///
/// Returns [`GeometryError::Degenerate`] if there are no points or they span
/// no extent along an axis.
pub fn normalize_outline(points: &[Point2], half_extent: f64, rotation_deg: f64) -> Result<Vec<Point2>> {
    if points.is_empty() {
        return Err(GeometryError::Degenerate("empty pad outline".to_owned()).into());
    }
    let rounded: Vec<Point2> = points.iter().map(|p| p.map(|c| round_to(c, 2))).collect();

    let xs = rescale_axis(rounded.iter().map(|p| p.x), half_extent, "x")?;
    let ys = rescale_axis(rounded.iter().map(|p| p.y), half_extent, "y")?;

    let theta = rotation_deg.to_radians();
    Ok(xs
        .into_iter()
        .zip(ys)
        .map(|(x, y)| {
            let (x, y) = rotate_2d(round_to(x, 2), round_to(y, 2), theta);
            Point2::new(round_to(x, 2), round_to(y, 2))
        })
        .collect())
}

/// Linear map of the values onto `[-half_extent, half_extent]`.
fn rescale_axis(values: impl Iterator<Item = f64> + Clone, half_extent: f64, axis: &str) -> Result<Vec<f64>> {
    let (min, max) = values
        .clone()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let span = max - min;
    if span <= 0.0 {
        return Err(GeometryError::Degenerate(format!("pad outline has no extent along {axis}")).into());
    }
    let scale = 2.0 * half_extent / span;
    Ok(values.map(|v| (v - min) * scale - half_extent).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use approx::assert_relative_eq;

    use super::*;
    use crate::error::PlannerError;

    #[test]
    fn rescales_each_axis() {
        let pts = vec![
            Point2::new(10.0, 5.0),
            Point2::new(30.0, 5.0),
            Point2::new(30.0, 6.0),
            Point2::new(20.0, 5.5),
        ];
        let out = normalize_outline(&pts, 27.25, 0.0).unwrap();
        assert_eq!(out[0], Point2::new(-27.25, -27.25));
        assert_eq!(out[2], Point2::new(27.25, 27.25));
        assert_eq!(out[3], Point2::new(0.0, 0.0));
    }

    #[test]
    fn rotation_is_applied_last() {
        let out = normalize_outline(&StaticOutline::square().points().unwrap(), 2.0, 90.0).unwrap();
        assert_relative_eq!(out[0].x, 2.0);
        assert_relative_eq!(out[0].y, -2.0);
        assert_relative_eq!(out[2].x, -2.0);
        assert_relative_eq!(out[2].y, 2.0);
    }

    #[test]
    fn flat_outline_is_degenerate() {
        let pts = vec![Point2::new(0.0, 1.0), Point2::new(4.0, 1.0)];
        assert!(normalize_outline(&pts, 1.0, 0.0).is_err());
        assert!(normalize_outline(&[], 1.0, 0.0).is_err());
    }

    #[test]
    fn reads_point_list_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# pad\n0 0\n4.5, 0\n\n4.5 2\n0\t2").unwrap();
        let pts = PointListOutline::new(file.path()).points().unwrap();
        assert_eq!(pts.len(), 4);
        assert_eq!(pts[1], Point2::new(4.5, 0.0));
        assert_eq!(pts[3], Point2::new(0.0, 2.0));
    }

    #[test]
    fn bad_lines_report_their_number() {
        let err = parse_point_list("1 2\n3 x\n").unwrap_err();
        assert!(matches!(
            err,
            PlannerError::MeshIo(MeshIoError::InvalidContent { line: 2, .. })
        ));
    }

    #[test]
    fn missing_outline_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.txt");
        let err = PointListOutline::new(&path).points().unwrap_err();
        assert!(matches!(
            err,
            PlannerError::MeshIo(MeshIoError::FileNotFound { path: ref p }) if *p == path
        ));

        std::fs::create_dir(&path).unwrap();
        let err = PointListOutline::new(&path).points().unwrap_err();
        assert!(matches!(err, PlannerError::MeshIo(MeshIoError::Io(_))));
    }
}
