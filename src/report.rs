//! Result aggregation: rounding and the `{status, result | message}` envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MeasureError;
use crate::pose::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    TragusToWall,
    SideFlexion,
    LumbarFlexion,
    CervicalRotation,
    IntermalleolarDistance,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::TragusToWall => "tragus-to-wall",
            MetricKind::SideFlexion => "side-flexion",
            MetricKind::LumbarFlexion => "lumbar-flexion",
            MetricKind::CervicalRotation => "cervical-rotation",
            MetricKind::IntermalleolarDistance => "intermalleolar-distance",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Cm,
    Degrees,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementValue {
    Scalar(f64),
    Sided { left: f64, right: f64 },
}

/// Unrounded output of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementResult {
    pub kind: MetricKind,
    pub side: Option<Side>,
    pub value: MeasurementValue,
    pub unit: Unit,
}

impl MeasurementResult {
    pub fn scalar(kind: MetricKind, side: Option<Side>, value: f64, unit: Unit) -> Self {
        Self { kind, side, value: MeasurementValue::Scalar(value), unit }
    }

    pub fn sided(kind: MetricKind, left: f64, right: f64, unit: Unit) -> Self {
        Self { kind, side: None, value: MeasurementValue::Sided { left, right }, unit }
    }

    /// Scalar value, `None` for sided results
    pub fn as_scalar(&self) -> Option<f64> {
        match self.value {
            MeasurementValue::Scalar(v) => Some(v),
            MeasurementValue::Sided { .. } => None,
        }
    }
}

/// One decimal place, `-0.0` reported as `0.0`
pub fn round1(value: f64) -> f64 {
    let r = (value * 10.0).round() / 10.0;
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// `result` field: a number, or `[left, right]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Scalar(f64),
    Sided([f64; 2]),
}

impl From<MeasurementValue> for ResultPayload {
    fn from(value: MeasurementValue) -> Self {
        match value {
            MeasurementValue::Scalar(v) => ResultPayload::Scalar(round1(v)),
            MeasurementValue::Sided { left, right } => {
                ResultPayload::Sided([round1(left), round1(right)])
            }
        }
    }
}

/// Response envelope sent back for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
    Success { result: ResultPayload },
    Error { message: String },
}

impl Envelope {
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error { message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }
}

/// Final step of every request
pub fn aggregate(outcome: Result<MeasurementResult, MeasureError>) -> Envelope {
    match outcome {
        Ok(result) => Envelope::Success { result: result.value.into() },
        Err(e) => Envelope::error(e.to_string()),
    }
}
