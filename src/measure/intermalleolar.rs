use crate::calibration::ScaleFactor;
use crate::error::MeasureResult;
use crate::pose::{CanonicalLandmarkSet, Role};
use crate::report::{MeasurementResult, MetricKind, Unit};

/// Distance between the ankles in cm
pub fn intermalleolar_distance(
    set: &CanonicalLandmarkSet,
    scale: ScaleFactor,
) -> MeasureResult<MeasurementResult> {
    let model = set.distance(Role::LeftAnkle, Role::RightAnkle)?;
    Ok(MeasurementResult::scalar(
        MetricKind::IntermalleolarDistance,
        None,
        scale.to_cm(model),
        Unit::Cm,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeasureError;
    use crate::pose::{CoordinateSpace, LandmarkPoint};

    fn ankles(left: LandmarkPoint, right: LandmarkPoint) -> CanonicalLandmarkSet {
        CanonicalLandmarkSet::from_points(
            CoordinateSpace::Model,
            [(Role::LeftAnkle, left), (Role::RightAnkle, right)],
        )
    }

    #[test]
    fn test_unit_scale() {
        let set = ankles(LandmarkPoint::new_3d(0.0, 0.0, 0.0), LandmarkPoint::new_3d(10.0, 0.0, 0.0));
        let r = intermalleolar_distance(&set, ScaleFactor::new(1.0).unwrap()).unwrap();
        assert!((r.as_scalar().unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric() {
        let a = LandmarkPoint::new_3d(1.0, 2.0, 0.5);
        let b = LandmarkPoint::new_3d(-3.0, 2.5, 1.0);
        let scale = ScaleFactor::new(2.5).unwrap();
        let r1 = intermalleolar_distance(&ankles(a, b), scale).unwrap();
        let r2 = intermalleolar_distance(&ankles(b, a), scale).unwrap();
        assert_eq!(r1.as_scalar(), r2.as_scalar());
        assert!(r1.as_scalar().unwrap() >= 0.0);
    }

    #[test]
    fn test_missing_ankle() {
        let set = CanonicalLandmarkSet::from_points(
            CoordinateSpace::Pixel,
            [(Role::LeftAnkle, LandmarkPoint::new(0.0, 0.0))],
        );
        assert_eq!(
            intermalleolar_distance(&set, ScaleFactor::metric()),
            Err(MeasureError::MissingLandmarkRole(Role::RightAnkle))
        );
    }
}
