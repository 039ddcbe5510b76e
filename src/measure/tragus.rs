use super::{axis_delta, horizontal_axis};
use crate::calibration::ScaleFactor;
use crate::error::MeasureResult;
use crate::pose::{CanonicalLandmarkSet, Role, Side};
use crate::report::{MeasurementResult, MetricKind, Unit};

/// Where the wall is
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WallReference {
    /// Wall boundary detected in the image, horizontal coordinate in the set's units
    Boundary(f64),
    /// Back of the body (thorax) touches the wall; distance is taken along depth
    DepthProxy,
}

/// Tragus-to-wall distance in cm
pub fn tragus_to_wall(
    set: &CanonicalLandmarkSet,
    side: Side,
    wall: WallReference,
    scale: ScaleFactor,
) -> MeasureResult<MeasurementResult> {
    let tragus = Role::tragus(side);
    let model = match wall {
        WallReference::Boundary(wall_x) => {
            let axis = horizontal_axis(set);
            let p = set.require(tragus)?;
            // horizontal axis always has a coordinate
            let h = p.component(axis).unwrap_or(p.x);
            (h - wall_x).abs()
        }
        WallReference::DepthProxy => axis_delta(set, tragus, Role::Thorax, set.depth_axis())?,
    };
    Ok(MeasurementResult::scalar(
        MetricKind::TragusToWall,
        Some(side),
        scale.to_cm(model),
        Unit::Cm,
    ))
}
