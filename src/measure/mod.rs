//! Clinical metric formulas.
//!
//! Every function here is pure: it reads canonical landmark sets and scale factors and
//! returns an unrounded [`MeasurementResult`](crate::report::MeasurementResult). Linear
//! distances are converted with the scale factor of the image they were measured on;
//! angles are never calibrated.

mod cervical;
mod flexion;
mod intermalleolar;
mod tragus;

pub use cervical::{cervical_rotation, head_vector};
pub use flexion::{lumbar_flexion, side_flexion};
pub use intermalleolar::intermalleolar_distance;
pub use tragus::{tragus_to_wall, WallReference};

use nalgebra::Vector3;

use crate::error::{MeasureError, MeasureResult};
use crate::pose::{Axis, CanonicalLandmarkSet, Role};

/// Signed `a - b` along `axis`.
///
/// Depth is optional on landmarks; asking for it on a 2D landmark is `MissingDepth`.
pub(crate) fn axis_offset(
    set: &CanonicalLandmarkSet,
    a: Role,
    b: Role,
    axis: Axis,
) -> MeasureResult<f64> {
    let pa = set.require(a)?.component(axis).ok_or(MeasureError::MissingDepth(a))?;
    let pb = set.require(b)?.component(axis).ok_or(MeasureError::MissingDepth(b))?;
    Ok(pa - pb)
}

/// Absolute difference of two roles along `axis`
pub(crate) fn axis_delta(
    set: &CanonicalLandmarkSet,
    a: Role,
    b: Role,
    axis: Axis,
) -> MeasureResult<f64> {
    axis_offset(set, a, b, axis).map(f64::abs)
}

/// Direction-agnostic displacement along the set's vertical axis
pub(crate) fn vertical_displacement(
    set: &CanonicalLandmarkSet,
    a: Role,
    b: Role,
) -> MeasureResult<f64> {
    axis_delta(set, a, b, set.vertical_axis())
}

/// The axis that is neither vertical nor depth
pub(crate) fn horizontal_axis(set: &CanonicalLandmarkSet) -> Axis {
    let (v, d) = (set.vertical_axis(), set.depth_axis());
    [Axis::X, Axis::Y, Axis::Z]
        .into_iter()
        .find(|&a| a != v && a != d)
        .unwrap_or(Axis::X)
}

/// Zero out the component along `axis`
pub(crate) fn project_out(v: Vector3<f64>, axis: Axis) -> Vector3<f64> {
    let mut p = v;
    match axis {
        Axis::X => p.x = 0.0,
        Axis::Y => p.y = 0.0,
        Axis::Z => p.z = 0.0,
    }
    p
}

/// `acos` in degrees with the argument clamped to [-1, 1]
pub fn angle_from_cosine(cos: f64) -> f64 {
    cos.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Angle between two vectors in degrees
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> MeasureResult<f64> {
    let denom = a.norm() * b.norm();
    if denom.is_nan() || denom <= f64::EPSILON {
        return Err(MeasureError::DegenerateVector(
            "zero-length vector has no direction".to_string(),
        ));
    }
    Ok(angle_from_cosine(a.dot(b) / denom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{CoordinateSpace, LandmarkPoint};

    #[test]
    fn test_domain_clamp() {
        assert_eq!(angle_from_cosine(1.0000001), 0.0);
        assert_eq!(angle_from_cosine(-1.0000001), 180.0);
        assert!((angle_from_cosine(0.0) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_angle_between() {
        let a = Vector3::new(0.0, 1.0, 0.0);
        let b = Vector3::new(1.0, 0.0, 0.0);
        assert!((angle_between(&a, &b).unwrap() - 90.0).abs() < 1e-12);
        assert!(angle_between(&a, &(a * 3.0)).unwrap().abs() < 1e-6);
        assert!(matches!(
            angle_between(&a, &Vector3::zeros()),
            Err(MeasureError::DegenerateVector(_))
        ));
    }

    #[test]
    fn test_axis_delta_depth() {
        let set = CanonicalLandmarkSet::from_points(
            CoordinateSpace::Metric,
            [
                (Role::LeftTragus, LandmarkPoint::new_3d(0.0, 1.6, 0.05)),
                (Role::Thorax, LandmarkPoint::new(0.0, 1.4)),
            ],
        );
        assert!((vertical_displacement(&set, Role::Thorax, Role::LeftTragus).unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(
            axis_delta(&set, Role::LeftTragus, Role::Thorax, Axis::Z),
            Err(MeasureError::MissingDepth(Role::Thorax))
        );
    }

    #[test]
    fn test_horizontal_axis() {
        let set = CanonicalLandmarkSet::from_points(CoordinateSpace::Pixel, Vec::new());
        assert_eq!(horizontal_axis(&set), Axis::X);
        assert_eq!(horizontal_axis(&set.with_axes(Axis::Z, Axis::X)), Axis::Y);
    }
}
