use super::{axis_offset, vertical_displacement};
use crate::calibration::ScaleFactor;
use crate::error::MeasureResult;
use crate::pose::{CanonicalLandmarkSet, Role, Side};
use crate::report::{MeasurementResult, MetricKind, Unit};

/// Lateral (side) flexion in cm.
///
/// Per image: vertical distance from the hand resting at the hip to the toe on the tested
/// side, in that image's scale. The result is the change between the two postures.
pub fn side_flexion(
    before: &CanonicalLandmarkSet,
    before_scale: ScaleFactor,
    after: &CanonicalLandmarkSet,
    after_scale: ScaleFactor,
    side: Side,
) -> MeasureResult<MeasurementResult> {
    let reach = |set: &CanonicalLandmarkSet, scale: ScaleFactor| -> MeasureResult<f64> {
        let d = vertical_displacement(set, Role::hip_proxy(side), Role::toe(side))?;
        Ok(scale.to_cm(d))
    };
    let before_cm = reach(before, before_scale)?;
    let after_cm = reach(after, after_scale)?;

    Ok(MeasurementResult::scalar(
        MetricKind::SideFlexion,
        Some(side),
        (before_cm - after_cm).abs(),
        Unit::Cm,
    ))
}

/// Lumbar (forward) flexion in cm, both sides.
///
/// Per image and side: signed vertical offset of the fingertip from the ankle.
/// Only the change between the two images is absolute.
pub fn lumbar_flexion(
    before: &CanonicalLandmarkSet,
    before_scale: ScaleFactor,
    after: &CanonicalLandmarkSet,
    after_scale: ScaleFactor,
) -> MeasureResult<MeasurementResult> {
    let mut change = [0.0; 2];
    for (slot, side) in change.iter_mut().zip(Side::BOTH) {
        let (tip, ankle) = (Role::fingertip(side), Role::ankle(side));
        let before_v = axis_offset(before, tip, ankle, before.vertical_axis())?;
        let after_v = axis_offset(after, tip, ankle, after.vertical_axis())?;
        let (before_cm, after_cm) = (before_scale.to_cm(before_v), after_scale.to_cm(after_v));
        *slot = (before_cm - after_cm).abs();
    }
    Ok(MeasurementResult::sided(
        MetricKind::LumbarFlexion,
        change[0],
        change[1],
        Unit::Cm,
    ))
}
