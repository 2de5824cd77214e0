use super::Vector3;

/// Rotates `v` about the unit axis `k` by `theta` radians (Rodrigues' formula).
///
/// `v' = v cos(theta) + (k x v) sin(theta) + k (k . v) (1 - cos(theta))`
///
/// `k` must be normalized; `v` may have any length and the result keeps it.
#[must_use]
pub fn rodrigues(v: &Vector3, k: &Vector3, theta: f64) -> Vector3 {
    let (sin, cos) = theta.sin_cos();
    v * cos + k.cross(v) * sin + k * k.dot(v) * (1.0 - cos)
}

/// 2D rotation of `(x, y)` about the origin by `theta` radians.
#[must_use]
pub fn rotate_2d(x: f64, y: f64, theta: f64) -> (f64, f64) {
    let (sin, cos) = theta.sin_cos();
    (cos * x - sin * y, sin * x + cos * y)
}
