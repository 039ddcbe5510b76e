//! Model-space → centimeter calibration.
//!
//! A scale factor is derived from a landmark pair whose physical length is known:
//! directly, through a secondary pair (cross-reference), or from the metric world layer
//! of the same image (world-reference).

use crate::error::{MeasureError, MeasureResult};
use crate::pose::{CanonicalLandmarkSet, CoordinateSpace, Role, Side};

/// Centimeters per metre, native factor of metric backends
pub const CM_PER_METRE: f64 = 100.0;

/// Centimeters per model unit. Always finite and > 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(cm_per_unit: f64) -> MeasureResult<Self> {
        if !cm_per_unit.is_finite() || cm_per_unit <= 0.0 {
            return Err(MeasureError::InvalidCalibration(format!(
                "scale factor must be finite and positive, got {}",
                cm_per_unit
            )));
        }
        Ok(Self(cm_per_unit))
    }

    /// From a ratio in model units per centimeter
    pub fn from_ratio(ratio: f64) -> MeasureResult<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(MeasureError::InvalidCalibration(format!(
                "ratio must be finite and positive, got {}",
                ratio
            )));
        }
        Self::new(1.0 / ratio)
    }

    pub fn metric() -> Self {
        Self(CM_PER_METRE)
    }

    /// Factor implied by the coordinate space alone, if any
    pub fn native(space: CoordinateSpace) -> Option<Self> {
        space.is_metric().then(Self::metric)
    }

    pub fn cm_per_unit(&self) -> f64 {
        self.0
    }

    /// Model units per centimeter
    pub fn ratio(&self) -> f64 {
        1.0 / self.0
    }

    pub fn to_cm(&self, model_distance: f64) -> f64 {
        model_distance * self.0
    }
}

/// Known physical length of the segment between two roles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationReference {
    pub physical_cm: f64,
    pub from: Role,
    pub to: Role,
}

impl CalibrationReference {
    pub fn new(physical_cm: f64, from: Role, to: Role) -> MeasureResult<Self> {
        if !physical_cm.is_finite() || physical_cm <= 0.0 {
            return Err(MeasureError::InvalidCalibration(format!(
                "physical reference must be finite and positive, got {} cm",
                physical_cm
            )));
        }
        Ok(Self { physical_cm, from, to })
    }

    /// Ankle to ankle
    pub fn intermalleolar(physical_cm: f64) -> MeasureResult<Self> {
        Self::new(physical_cm, Role::LeftAnkle, Role::RightAnkle)
    }

    /// Knee to ankle
    pub fn shin(side: Side, physical_cm: f64) -> MeasureResult<Self> {
        Self::new(physical_cm, Role::knee(side), Role::ankle(side))
    }

    /// Shoulder to toe, the standing body line
    pub fn body_line(side: Side, physical_cm: f64) -> MeasureResult<Self> {
        Self::new(physical_cm, Role::shoulder(side), Role::toe(side))
    }

    pub fn roles(&self) -> (Role, Role) {
        (self.from, self.to)
    }
}

/// Scale of `set` from a reference measured on the same body.
///
/// `ratio = model distance / physical length`, factor = `1 / ratio`.
pub fn direct(set: &CanonicalLandmarkSet, reference: &CalibrationReference) -> MeasureResult<ScaleFactor> {
    let model = set.distance(reference.from, reference.to)?;
    ScaleFactor::from_ratio(model / reference.physical_cm)
}

/// Derives the physical length of a secondary pair on `set` using the scale that
/// `reference` gives on the same image.
///
/// e.g. measured intermalleolar 12.0 cm over 24.0 model units calibrates a 60.0 unit
/// shin to 30.0 cm.
pub fn cross_reference(
    set: &CanonicalLandmarkSet,
    reference: &CalibrationReference,
    secondary: (Role, Role),
) -> MeasureResult<CalibrationReference> {
    let scale = direct(set, reference)?;
    let model = set.distance(secondary.0, secondary.1)?;
    CalibrationReference::new(scale.to_cm(model), secondary.0, secondary.1)
}

/// Reads the physical length of a pair from a metric (world) landmark set.
pub fn world_reference(
    world: &CanonicalLandmarkSet,
    from: Role,
    to: Role,
) -> MeasureResult<CalibrationReference> {
    let Some(native) = ScaleFactor::native(world.space()) else {
        return Err(MeasureError::InvalidCalibration(format!(
            "world reference needs metric landmarks, got {:?}",
            world.space()
        )));
    };
    let model = world.distance(from, to)?;
    CalibrationReference::new(native.to_cm(model), from, to)
}

/// One reference, applied independently to every image of a request.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationSession {
    reference: CalibrationReference,
}

impl CalibrationSession {
    pub fn new(reference: CalibrationReference) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &CalibrationReference {
        &self.reference
    }

    /// Metric sets keep their native factor; others are recalibrated on their own pair
    pub fn scale_for(&self, set: &CanonicalLandmarkSet) -> MeasureResult<ScaleFactor> {
        match ScaleFactor::native(set.space()) {
            Some(native) => Ok(native),
            None => direct(set, &self.reference),
        }
    }
}
