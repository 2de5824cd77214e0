pub mod hull;
pub mod rotation;

/// 2D point type.
pub type Point2 = nalgebra::Point2<f64>;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Rounds every coordinate of `p` to `decimals` decimal places.
#[must_use]
pub fn round_point(p: &Point3, decimals: u32) -> Point3 {
    let scale = 10f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
    p.map(|c| (c * scale).round() / scale)
}

/// Rounds a scalar to `decimals` decimal places.
#[must_use]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
    (value * scale).round() / scale
}

/// Orders points lexicographically on `(x, y, z)`.
#[must_use]
pub fn lexicographic(a: &Point3, b: &Point3) -> std::cmp::Ordering {
    a.x.total_cmp(&b.x)
        .then(a.y.total_cmp(&b.y))
        .then(a.z.total_cmp(&b.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_per_coordinate() {
        let p = round_point(&Point3::new(1.23456, -0.00004, 2.99999), 4);
        assert!((p.x - 1.2346).abs() < TOLERANCE);
        assert!(p.y.abs() < TOLERANCE);
        assert!((p.z - 3.0).abs() < TOLERANCE);
    }

    #[test]
    fn lexicographic_breaks_ties_on_later_axes() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(1.0, 2.0, 4.0);
        assert_eq!(lexicographic(&a, &b), std::cmp::Ordering::Less);
        assert_eq!(lexicographic(&b, &a), std::cmp::Ordering::Greater);
        assert_eq!(lexicographic(&a, &a), std::cmp::Ordering::Equal);
    }
}
