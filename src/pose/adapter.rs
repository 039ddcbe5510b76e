use serde::{Deserialize, Serialize};

use super::keypoint::{CanonicalLandmarkSet, LandmarkPoint, Role};
use super::topology::{Backend, CoordinateSpace};
use crate::error::{MeasureError, MeasureResult};

/// One keypoint as emitted by a backend, in its native convention
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawKeypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Confidence / visibility, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl RawKeypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None, score: None }
    }

    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z), score: None }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Raw output of one backend layer for one image.
///
/// An empty keypoint list means no body was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub backend: Backend,
    pub keypoints: Vec<RawKeypoint>,
    /// Source image size, used to denormalize fractional coordinates
    pub image_width: u32,
    pub image_height: u32,
}

impl RawDetection {
    pub fn empty(backend: Backend, image_width: u32, image_height: u32) -> Self {
        Self { backend, keypoints: Vec::new(), image_width, image_height }
    }
}

/// Maps backend keypoint lists to canonical role-keyed sets
#[derive(Debug, Clone, Copy)]
pub struct LandmarkAdapter {
    min_score: f64,
}

impl Default for LandmarkAdapter {
    fn default() -> Self {
        Self { min_score: 0.0 }
    }
}

impl LandmarkAdapter {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    pub fn normalize(&self, raw: &RawDetection) -> MeasureResult<CanonicalLandmarkSet> {
        self.normalize_in(raw, (raw.image_width, raw.image_height))
    }

    /// `normalize` for a detection made on an image of `frame` (width, height) pixels.
    ///
    /// A size the backend reports wins; `frame` fills in a zero width or height.
    pub fn normalize_in(
        &self,
        raw: &RawDetection,
        frame: (u32, u32),
    ) -> MeasureResult<CanonicalLandmarkSet> {
        if raw.keypoints.is_empty() {
            return Err(MeasureError::NoBodyDetected);
        }
        let topo = raw.backend.topology();
        let or_frame = |reported: u32, decoded: u32| if reported == 0 { decoded } else { reported };

        // 正規化座標はピクセルに戻す。相対深度は x/y と比較できないので捨てる
        let (space, sx, sy) = match topo.space {
            CoordinateSpace::NormalizedImage => (
                CoordinateSpace::Pixel,
                or_frame(raw.image_width, frame.0) as f64,
                or_frame(raw.image_height, frame.1) as f64,
            ),
            other => (other, 1.0, 1.0),
        };
        let keep_depth = topo.space != CoordinateSpace::NormalizedImage;

        let points = topo.roles.iter().filter_map(|&(role, idx)| {
            let kp = raw.keypoints.get(idx)?;
            if kp.score.is_some_and(|s| s < self.min_score) {
                return None;
            }
            let point = LandmarkPoint {
                x: kp.x * sx,
                y: kp.y * sy,
                z: if keep_depth { kp.z } else { None },
            };
            point.is_finite().then_some((role, point))
        });

        Ok(CanonicalLandmarkSet::from_points(space, points)
            .with_axes(topo.vertical_axis, topo.depth_axis))
    }

    /// `normalize`, then fail on the first absent role of `roles`
    pub fn normalize_requiring(
        &self,
        raw: &RawDetection,
        roles: &[Role],
    ) -> MeasureResult<CanonicalLandmarkSet> {
        let set = self.normalize(raw)?;
        set.require_all(roles)?;
        Ok(set)
    }
}
