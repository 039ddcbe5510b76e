use std::collections::BTreeMap;
use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::topology::{Axis, CoordinateSpace};
use crate::error::{MeasureError, MeasureResult};

/// Body side of a sided measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Canonical anatomical role, independent of backend topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Nose,
    LeftTragus,
    RightTragus,
    /// Base of the neck; depth reference for the back of the body
    Thorax,
    LeftShoulder,
    RightShoulder,
    /// Hand landmark resting alongside the hip in the neutral side-flexion posture
    LeftHipProxy,
    RightHipProxy,
    LeftFingertip,
    RightFingertip,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftToe,
    RightToe,
}

impl Role {
    pub fn tragus(side: Side) -> Self {
        match side {
            Side::Left => Role::LeftTragus,
            Side::Right => Role::RightTragus,
        }
    }

    pub fn shoulder(side: Side) -> Self {
        match side {
            Side::Left => Role::LeftShoulder,
            Side::Right => Role::RightShoulder,
        }
    }

    pub fn hip_proxy(side: Side) -> Self {
        match side {
            Side::Left => Role::LeftHipProxy,
            Side::Right => Role::RightHipProxy,
        }
    }

    pub fn fingertip(side: Side) -> Self {
        match side {
            Side::Left => Role::LeftFingertip,
            Side::Right => Role::RightFingertip,
        }
    }

    pub fn knee(side: Side) -> Self {
        match side {
            Side::Left => Role::LeftKnee,
            Side::Right => Role::RightKnee,
        }
    }

    pub fn ankle(side: Side) -> Self {
        match side {
            Side::Left => Role::LeftAnkle,
            Side::Right => Role::RightAnkle,
        }
    }

    pub fn toe(side: Side) -> Self {
        match side {
            Side::Left => Role::LeftToe,
            Side::Right => Role::RightToe,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Single landmark in the coordinate space of its backend.
/// `z` is `None` for 2D-only landmarks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn is_3d(&self) -> bool {
        self.z.is_some()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }

    /// Coordinate along `axis`; `None` when asking for depth of a 2D point
    pub fn component(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => Some(self.x),
            Axis::Y => Some(self.y),
            Axis::Z => self.z,
        }
    }

    /// Position vector, 2D points lie in the z = 0 plane
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z.unwrap_or(0.0))
    }

    /// Euclidean distance; 3D when both points carry depth, planar otherwise
    pub fn distance(&self, other: &LandmarkPoint) -> f64 {
        match (self.z, other.z) {
            (Some(_), Some(_)) => (self.to_vector() - other.to_vector()).norm(),
            _ => ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt(),
        }
    }

    pub fn midpoint(&self, other: &LandmarkPoint) -> LandmarkPoint {
        let z = match (self.z, other.z) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            _ => None,
        };
        LandmarkPoint {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z,
        }
    }

    pub fn scaled(&self, k: f64) -> LandmarkPoint {
        LandmarkPoint {
            x: self.x * k,
            y: self.y * k,
            z: self.z.map(|z| z * k),
        }
    }
}

/// Landmarks of one detected body in one image, keyed by anatomical role.
///
/// A role is present only if the source backend detected it. The set also remembers the
/// coordinate space and axis convention of its backend so that calibration and the metric
/// formulas never mix conventions.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalLandmarkSet {
    points: BTreeMap<Role, LandmarkPoint>,
    space: CoordinateSpace,
    vertical: Axis,
    depth: Axis,
}

impl CanonicalLandmarkSet {
    /// Build a set with the default image convention (y vertical, z depth)
    pub fn from_points<I>(space: CoordinateSpace, points: I) -> Self
    where
        I: IntoIterator<Item = (Role, LandmarkPoint)>,
    {
        Self {
            points: points.into_iter().collect(),
            space,
            vertical: Axis::Y,
            depth: Axis::Z,
        }
    }

    pub fn with_axes(mut self, vertical: Axis, depth: Axis) -> Self {
        self.vertical = vertical;
        self.depth = depth;
        self
    }

    pub fn get(&self, role: Role) -> Option<&LandmarkPoint> {
        self.points.get(&role)
    }

    pub fn require(&self, role: Role) -> MeasureResult<&LandmarkPoint> {
        self.points
            .get(&role)
            .ok_or(MeasureError::MissingLandmarkRole(role))
    }

    /// Fails on the first role in `roles` that is absent
    pub fn require_all(&self, roles: &[Role]) -> MeasureResult<()> {
        for &role in roles {
            self.require(role)?;
        }
        Ok(())
    }

    pub fn contains(&self, role: Role) -> bool {
        self.points.contains_key(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.points.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    pub fn vertical_axis(&self) -> Axis {
        self.vertical
    }

    pub fn depth_axis(&self) -> Axis {
        self.depth
    }

    /// Model-space distance between two roles
    pub fn distance(&self, a: Role, b: Role) -> MeasureResult<f64> {
        Ok(self.require(a)?.distance(self.require(b)?))
    }

    /// Copy of the set with every coordinate multiplied by `k`
    pub fn scaled(&self, k: f64) -> CanonicalLandmarkSet {
        CanonicalLandmarkSet {
            points: self.points.iter().map(|(&r, p)| (r, p.scaled(k))).collect(),
            space: self.space,
            vertical: self.vertical,
            depth: self.depth,
        }
    }
}
