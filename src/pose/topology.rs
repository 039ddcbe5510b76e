//! Static keypoint topologies of the supported pose-estimation backends.
//!
//! Each backend is a data table: keypoint count, coordinate convention and the
//! role → index mapping consumed by the landmark adapter.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use super::keypoint::Role;

/// Coordinate convention of a backend's raw output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Fractions of image width/height (0.0〜1.0)
    NormalizedImage,
    Pixel,
    /// Unitless model space, calibration required
    Model,
    /// Metres
    Metric,
}

impl CoordinateSpace {
    pub fn is_metric(self) -> bool {
        self == CoordinateSpace::Metric
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Supported pose-estimation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// MediaPipe Pose Landmarker, normalized image landmarks (33)
    MediapipePose,
    /// MediaPipe Pose Landmarker, world landmarks in metres (33)
    MediapipeWorld,
    /// MoveNet single pose (17, COCO)
    Movenet,
    /// RTMPose COCO-WholeBody 2D, pixel coordinates (133)
    Wholebody,
    /// RTMW3D COCO-WholeBody 3D, model units (133)
    Rtmw3d,
    /// MotionBERT-style Human3.6M lifter, metres (17)
    Human3d,
}

impl Backend {
    pub const ALL: [Backend; 6] = [
        Backend::MediapipePose,
        Backend::MediapipeWorld,
        Backend::Movenet,
        Backend::Wholebody,
        Backend::Rtmw3d,
        Backend::Human3d,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Backend::MediapipePose => "mediapipe_pose",
            Backend::MediapipeWorld => "mediapipe_world",
            Backend::Movenet => "movenet",
            Backend::Wholebody => "wholebody",
            Backend::Rtmw3d => "rtmw3d",
            Backend::Human3d => "human3d",
        }
    }

    pub fn topology(self) -> &'static Topology {
        match self {
            Backend::MediapipePose => &MEDIAPIPE_POSE,
            Backend::MediapipeWorld => &MEDIAPIPE_WORLD,
            Backend::Movenet => &MOVENET,
            Backend::Wholebody => &WHOLEBODY,
            Backend::Rtmw3d => &RTMW3D,
            Backend::Human3d => &HUMAN3D,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match Backend::ALL.iter().find(|b| b.name() == s) {
            Some(&b) => Ok(b),
            None => bail!("Unknown backend: {}", s),
        }
    }
}

/// Keypoint layout of one backend
#[derive(Debug)]
pub struct Topology {
    pub keypoint_count: usize,
    pub space: CoordinateSpace,
    pub vertical_axis: Axis,
    pub depth_axis: Axis,
    /// Role → raw index; several roles may share an index
    pub roles: &'static [(Role, usize)],
}

impl Topology {
    pub fn index_of(&self, role: Role) -> Option<usize> {
        self.roles.iter().find(|(r, _)| *r == role).map(|&(_, i)| i)
    }
}

// --- MediaPipe Pose (33) ---

const MEDIAPIPE_ROLES: &[(Role, usize)] = &[
    (Role::Nose, 0),
    (Role::LeftTragus, 7), // left ear
    (Role::RightTragus, 8),
    (Role::LeftShoulder, 11),
    (Role::RightShoulder, 12),
    (Role::LeftHipProxy, 17), // left pinky
    (Role::RightHipProxy, 18),
    (Role::LeftFingertip, 19), // left index
    (Role::RightFingertip, 20),
    (Role::LeftHip, 23),
    (Role::RightHip, 24),
    (Role::LeftKnee, 25),
    (Role::RightKnee, 26),
    (Role::LeftAnkle, 27),
    (Role::RightAnkle, 28),
    (Role::LeftHeel, 29),
    (Role::RightHeel, 30),
    (Role::LeftToe, 31), // foot index
    (Role::RightToe, 32),
];

static MEDIAPIPE_POSE: Topology = Topology {
    keypoint_count: 33,
    space: CoordinateSpace::NormalizedImage,
    vertical_axis: Axis::Y,
    depth_axis: Axis::Z,
    roles: MEDIAPIPE_ROLES,
};

static MEDIAPIPE_WORLD: Topology = Topology {
    keypoint_count: 33,
    space: CoordinateSpace::Metric,
    vertical_axis: Axis::Y,
    depth_axis: Axis::Z,
    roles: MEDIAPIPE_ROLES,
};

// --- MoveNet (17, COCO body) ---

static MOVENET: Topology = Topology {
    keypoint_count: 17,
    space: CoordinateSpace::NormalizedImage,
    vertical_axis: Axis::Y,
    depth_axis: Axis::Z,
    roles: &[
        (Role::Nose, 0),
        (Role::LeftTragus, 3),
        (Role::RightTragus, 4),
        (Role::LeftShoulder, 5),
        (Role::RightShoulder, 6),
        (Role::LeftHip, 11),
        (Role::RightHip, 12),
        (Role::LeftKnee, 13),
        (Role::RightKnee, 14),
        (Role::LeftAnkle, 15),
        (Role::RightAnkle, 16),
    ],
};

// --- COCO-WholeBody (133) ---
// 0-16 body, 17-22 feet, 23-90 face, 91-111 left hand, 112-132 right hand

const WHOLEBODY_ROLES: &[(Role, usize)] = &[
    (Role::Nose, 0),
    (Role::LeftTragus, 3),
    (Role::RightTragus, 4),
    (Role::LeftShoulder, 5),
    (Role::RightShoulder, 6),
    (Role::LeftHipProxy, 104),
    (Role::RightHipProxy, 125),
    (Role::LeftFingertip, 104),
    (Role::RightFingertip, 125),
    (Role::LeftHip, 11),
    (Role::RightHip, 12),
    (Role::LeftKnee, 13),
    (Role::RightKnee, 14),
    (Role::LeftAnkle, 15),
    (Role::RightAnkle, 16),
    (Role::LeftToe, 18), // small toe
    (Role::LeftHeel, 19),
    (Role::RightToe, 21),
    (Role::RightHeel, 22),
];

static WHOLEBODY: Topology = Topology {
    keypoint_count: 133,
    space: CoordinateSpace::Pixel,
    vertical_axis: Axis::Y,
    depth_axis: Axis::Z,
    roles: WHOLEBODY_ROLES,
};

static RTMW3D: Topology = Topology {
    keypoint_count: 133,
    space: CoordinateSpace::Model,
    vertical_axis: Axis::Y,
    depth_axis: Axis::Z,
    roles: WHOLEBODY_ROLES,
};

// --- Human3.6M (17) ---
// 0 root, 1-3 right leg, 4-6 left leg, 7 spine, 8 thorax, 9 nose, 10 head,
// 11-13 left arm, 14-16 right arm
// MMPose rotates lifted poses to z-up with y pointing away from the camera

static HUMAN3D: Topology = Topology {
    keypoint_count: 17,
    space: CoordinateSpace::Metric,
    vertical_axis: Axis::Z,
    depth_axis: Axis::Y,
    roles: &[
        (Role::Nose, 9),
        (Role::LeftTragus, 10), // head
        (Role::RightTragus, 10),
        (Role::Thorax, 8),
        (Role::LeftShoulder, 11),
        (Role::RightShoulder, 14),
        (Role::LeftHipProxy, 13), // wrist
        (Role::RightHipProxy, 16),
        (Role::LeftFingertip, 13),
        (Role::RightFingertip, 16),
        (Role::LeftHip, 4),
        (Role::RightHip, 1),
        (Role::LeftKnee, 5),
        (Role::RightKnee, 2),
        (Role::LeftAnkle, 6),
        (Role::RightAnkle, 3),
        (Role::LeftToe, 6), // foot
        (Role::RightToe, 3),
    ],
};
