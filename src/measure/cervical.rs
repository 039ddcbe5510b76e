use nalgebra::Vector3;

use super::{angle_between, project_out};
use crate::error::{MeasureError, MeasureResult};
use crate::pose::{CanonicalLandmarkSet, Role, Side};
use crate::report::{MeasurementResult, MetricKind, Unit};

/// Facing direction: shoulder midpoint → nose, with the vertical component removed
pub fn head_vector(set: &CanonicalLandmarkSet) -> MeasureResult<Vector3<f64>> {
    let mid = set
        .require(Role::LeftShoulder)?
        .midpoint(set.require(Role::RightShoulder)?);
    let nose = set.require(Role::Nose)?;
    let v = project_out(nose.to_vector() - mid.to_vector(), set.vertical_axis());
    if v.norm() <= f64::EPSILON {
        return Err(MeasureError::DegenerateVector(
            "nose is straight above the shoulder midpoint".to_string(),
        ));
    }
    Ok(v)
}

/// Cervical rotation in degrees between a neutral and a rotated pose.
///
/// Angles need no calibration; `side` only labels the result.
pub fn cervical_rotation(
    before: &CanonicalLandmarkSet,
    after: &CanonicalLandmarkSet,
    side: Side,
) -> MeasureResult<MeasurementResult> {
    let a = head_vector(before)?;
    let b = head_vector(after)?;
    Ok(MeasurementResult::scalar(
        MetricKind::CervicalRotation,
        Some(side),
        angle_between(&a, &b)?,
        Unit::Degrees,
    ))
}
