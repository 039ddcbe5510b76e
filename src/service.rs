//! Per-request orchestration: decode → infer → normalize → calibrate → measure → aggregate.

use std::collections::HashMap;

use crate::calibration::{self, CalibrationReference, CalibrationSession, ScaleFactor};
use crate::config::RoutingConfig;
use crate::error::{MeasureError, MeasureResult};
use crate::imaging::{decode_base64, DecodedImage};
use crate::measure::{self, WallReference};
use crate::pose::{Backend, BackendRegistry, CanonicalLandmarkSet, LandmarkAdapter, RawDetection, Role, Side};
use crate::protocol::MeasureRequest;
use crate::report::{aggregate, Envelope, MeasurementResult};

/// One submitted photo and the backend outputs computed for it so far.
///
/// Each provider runs at most once per photo, however many of its layers are used.
struct Capture<'a> {
    image: DecodedImage,
    registry: &'a BackendRegistry,
    adapter: LandmarkAdapter,
    outputs: HashMap<usize, Vec<RawDetection>>,
}

impl<'a> Capture<'a> {
    fn new(image: DecodedImage, registry: &'a BackendRegistry, adapter: LandmarkAdapter) -> Self {
        Self { image, registry, adapter, outputs: HashMap::new() }
    }

    async fn detection(&mut self, layer: Backend) -> MeasureResult<&RawDetection> {
        let registry = self.registry;
        let (idx, provider) = registry.provider(layer)?;
        if !self.outputs.contains_key(&idx) {
            let out = provider
                .infer(&self.image)
                .await
                .map_err(|e| MeasureError::Inference(format!("{}: {:#}", provider.name(), e)))?;
            self.outputs.insert(idx, out);
        }
        self.outputs
            .get(&idx)
            .and_then(|out| out.iter().find(|d| d.backend == layer))
            .ok_or_else(|| {
                MeasureError::Inference(format!("{} returned no {} layer", provider.name(), layer))
            })
    }

    async fn landmarks(&mut self, layer: Backend) -> MeasureResult<CanonicalLandmarkSet> {
        let (adapter, frame) = (self.adapter, (self.image.width(), self.image.height()));
        adapter.normalize_in(self.detection(layer).await?, frame)
    }
}

/// Stateless between requests; the registry is shared.
pub struct MeasurementService {
    registry: BackendRegistry,
    adapter: LandmarkAdapter,
    routing: RoutingConfig,
}

impl MeasurementService {
    pub fn new(registry: BackendRegistry, adapter: LandmarkAdapter, routing: RoutingConfig) -> Self {
        Self { registry, adapter, routing }
    }

    /// Never fails; errors become `{"status": "error"}` envelopes
    pub async fn handle(&self, req: &MeasureRequest) -> Envelope {
        aggregate(self.measure(req).await)
    }

    pub async fn measure(&self, req: &MeasureRequest) -> MeasureResult<MeasurementResult> {
        match req {
            MeasureRequest::TragusToWall { side, image, wall_x } => {
                let mut cap = self.capture(image)?;
                match wall_x {
                    Some(x) => {
                        let set = cap.landmarks(self.routing.tragus_wall).await?;
                        let scale = self
                            .image_scale(&mut cap, &set, Role::shoulder(*side), Role::toe(*side))
                            .await?;
                        measure::tragus_to_wall(&set, *side, WallReference::Boundary(*x), scale)
                    }
                    None => {
                        let set = cap.landmarks(self.routing.tragus_depth).await?;
                        let scale = self
                            .image_scale(&mut cap, &set, Role::shoulder(*side), Role::toe(*side))
                            .await?;
                        measure::tragus_to_wall(&set, *side, WallReference::DepthProxy, scale)
                    }
                }
            }
            MeasureRequest::SideFlexion { side, image1, image2 } => {
                let (mut before, mut after) = self.capture_pair(image1, image2)?;
                let layer = self.routing.side_flexion;
                let (shoulder, toe) = (Role::shoulder(*side), Role::toe(*side));

                let before_set = before.landmarks(layer).await?;
                let before_scale = self.image_scale(&mut before, &before_set, shoulder, toe).await?;
                let after_set = after.landmarks(layer).await?;
                let after_scale = self.image_scale(&mut after, &after_set, shoulder, toe).await?;

                measure::side_flexion(&before_set, before_scale, &after_set, after_scale, *side)
            }
            MeasureRequest::LumbarFlexion { image1, image2, shin_cm, intermalleolar_cm } => {
                let (mut before, mut after) = self.capture_pair(image1, image2)?;
                let layer = self.routing.lumbar_flexion;

                let before_set = before.landmarks(layer).await?;
                let after_set = after.landmarks(layer).await?;
                let reference = self
                    .shin_reference(&mut before, &before_set, *shin_cm, *intermalleolar_cm)
                    .await?;

                let session = CalibrationSession::new(reference);
                measure::lumbar_flexion(
                    &before_set,
                    session.scale_for(&before_set)?,
                    &after_set,
                    session.scale_for(&after_set)?,
                )
            }
            MeasureRequest::CervicalRotation { side, image1, image2 } => {
                let (mut before, mut after) = self.capture_pair(image1, image2)?;
                let layer = self.routing.cervical_rotation;
                let before_set = before.landmarks(layer).await?;
                let after_set = after.landmarks(layer).await?;
                measure::cervical_rotation(&before_set, &after_set, *side)
            }
            MeasureRequest::IntermalleolarDistance { image, shin_cm } => {
                let mut cap = self.capture(image)?;
                let set = cap.landmarks(self.routing.intermalleolar_distance).await?;
                let scale = match shin_cm {
                    Some(cm) => {
                        let side = shin_side(&set);
                        calibration::direct(&set, &CalibrationReference::shin(side, *cm)?)?
                    }
                    None => {
                        self.image_scale(&mut cap, &set, Role::LeftAnkle, Role::RightAnkle)
                            .await?
                    }
                };
                measure::intermalleolar_distance(&set, scale)
            }
        }
    }

    fn capture(&self, field: &Option<String>) -> MeasureResult<Capture<'_>> {
        let image = decode_base64(field.as_deref())?;
        Ok(Capture::new(image, &self.registry, self.adapter))
    }

    /// Both photos are decoded before any inference runs
    fn capture_pair(
        &self,
        first: &Option<String>,
        second: &Option<String>,
    ) -> MeasureResult<(Capture<'_>, Capture<'_>)> {
        Ok((self.capture(first)?, self.capture(second)?))
    }

    /// Scale of `set` for its own photo.
    ///
    /// Metric layers need none; image layers are calibrated on the `from`–`to` segment read
    /// from the world layer of the same photo.
    async fn image_scale(
        &self,
        cap: &mut Capture<'_>,
        set: &CanonicalLandmarkSet,
        from: Role,
        to: Role,
    ) -> MeasureResult<ScaleFactor> {
        if let Some(native) = ScaleFactor::native(set.space()) {
            return Ok(native);
        }
        let world = cap.landmarks(self.routing.world).await?;
        let reference = calibration::world_reference(&world, from, to)?;
        calibration::direct(set, &reference)
    }

    /// Shin length for lumbar flexion, first available of:
    /// measured shin, shin calibrated from a measured intermalleolar distance, world layer.
    async fn shin_reference(
        &self,
        cap: &mut Capture<'_>,
        set: &CanonicalLandmarkSet,
        shin_cm: Option<f64>,
        intermalleolar_cm: Option<f64>,
    ) -> MeasureResult<CalibrationReference> {
        let side = shin_side(set);
        let shin = (Role::knee(side), Role::ankle(side));

        if let Some(cm) = shin_cm {
            return CalibrationReference::shin(side, cm);
        }
        if let Some(cm) = intermalleolar_cm {
            let intermalleolar = CalibrationReference::intermalleolar(cm)?;
            return calibration::cross_reference(set, &intermalleolar, shin);
        }
        if set.space().is_metric() {
            return calibration::world_reference(set, shin.0, shin.1);
        }
        let world = cap.landmarks(self.routing.world).await?;
        calibration::world_reference(&world, shin.0, shin.1)
    }
}

/// Left shin unless only the right one is visible
fn shin_side(set: &CanonicalLandmarkSet) -> Side {
    let visible = |side| set.contains(Role::knee(side)) && set.contains(Role::ankle(side));
    if !visible(Side::Left) && visible(Side::Right) {
        Side::Right
    } else {
        Side::Left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::imaging::encode_base64;
    use crate::imaging::tests::png_bytes;
    use crate::pose::{PoseBackend, RawKeypoint};
    use crate::report::ResultPayload;

    /// Answers by image width so tests can tell photos apart
    struct Stub {
        layers: Vec<Backend>,
        by_width: HashMap<u32, Vec<RawDetection>>,
        calls: AtomicUsize,
    }

    impl Stub {
        fn new(layers: &[Backend]) -> Self {
            Self { layers: layers.to_vec(), by_width: HashMap::new(), calls: AtomicUsize::new(0) }
        }

        fn on(mut self, width: u32, detections: Vec<RawDetection>) -> Self {
            self.by_width.insert(width, detections);
            self
        }
    }

    #[async_trait]
    impl PoseBackend for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn provides(&self) -> &[Backend] {
            &self.layers
        }

        async fn infer(&self, image: &DecodedImage) -> anyhow::Result<Vec<RawDetection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.by_width.get(&image.width()).cloned().unwrap_or_else(|| {
                self.layers
                    .iter()
                    .map(|&b| RawDetection::empty(b, image.width(), image.height()))
                    .collect()
            }))
        }
    }

    fn layer(backend: Backend, w: u32, h: u32, points: &[(usize, RawKeypoint)]) -> RawDetection {
        let count = backend.topology().keypoint_count;
        let mut keypoints = vec![RawKeypoint::new_3d(0.5, 0.5, 0.0); count];
        for &(idx, kp) in points {
            keypoints[idx] = kp;
        }
        RawDetection { backend, keypoints, image_width: w, image_height: h }
    }

    fn photo(width: u32, height: u32) -> Option<String> {
        Some(encode_base64(&png_bytes(width, height)))
    }

    fn service(stubs: Vec<Arc<Stub>>, routing: RoutingConfig) -> MeasurementService {
        let mut registry = BackendRegistry::new();
        for stub in stubs {
            registry.register(stub);
        }
        MeasurementService::new(registry, LandmarkAdapter::default(), routing)
    }

    fn scalar(env: &Envelope) -> f64 {
        match env {
            Envelope::Success { result: ResultPayload::Scalar(v) } => *v,
            other => panic!("expected scalar result, got {:?}", other),
        }
    }

    const MEDIAPIPE: &[Backend] = &[Backend::MediapipePose, Backend::MediapipeWorld];

    /// Standing side-on: shoulder and toe 700 px apart, 1.4 m in the world layer
    fn mediapipe_standing(width: u32, hip_proxy_y: f64) -> Vec<RawDetection> {
        let pose = layer(
            Backend::MediapipePose,
            width,
            1000,
            &[
                (11, RawKeypoint::new(0.5, 0.2)),
                (17, RawKeypoint::new(0.5, hip_proxy_y)),
                (31, RawKeypoint::new(0.5, 0.9)),
            ],
        );
        let world = layer(
            Backend::MediapipeWorld,
            width,
            1000,
            &[
                (11, RawKeypoint::new_3d(0.0, -0.5, 0.0)),
                (31, RawKeypoint::new_3d(0.0, 0.9, 0.0)),
            ],
        );
        vec![pose, world]
    }

    #[tokio::test]
    async fn test_side_flexion_world_calibrated() {
        let stub = Arc::new(
            Stub::new(MEDIAPIPE)
                .on(100, mediapipe_standing(100, 0.5))
                .on(101, mediapipe_standing(101, 0.6)),
        );
        let svc = service(vec![Arc::clone(&stub)], RoutingConfig::default());

        let req = MeasureRequest::SideFlexion {
            side: Side::Left,
            image1: photo(100, 1000),
            image2: photo(101, 1000),
        };
        let env = svc.handle(&req).await;
        // 0.2 cm/px: 400 px → 80 cm, 300 px → 60 cm
        assert!((scalar(&env) - 20.0).abs() < 1e-9);
        // one inference per photo, both layers reused
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lumbar_cross_reference() {
        // ankles 40 px apart, shin 120 px; second photo from twice as far
        let wholebody = |width: u32, k: f64, tip_y: f64| {
            layer(
                Backend::Wholebody,
                width,
                600,
                &[
                    (13, RawKeypoint::new(100.0 * k, 380.0 * k)),
                    (15, RawKeypoint::new(100.0 * k, 500.0 * k)),
                    (16, RawKeypoint::new(140.0 * k, 500.0 * k)),
                    (104, RawKeypoint::new(100.0 * k, tip_y * k)),
                    (125, RawKeypoint::new(140.0 * k, tip_y * k)),
                ],
            )
        };
        let stub = Arc::new(
            Stub::new(&[Backend::Wholebody])
                .on(200, vec![wholebody(200, 1.0, 300.0)])
                .on(201, vec![wholebody(201, 0.5, 400.0)]),
        );
        let routing = RoutingConfig { lumbar_flexion: Backend::Wholebody, ..RoutingConfig::default() };
        let svc = service(vec![stub], routing);

        let req = MeasureRequest::LumbarFlexion {
            image1: photo(200, 600),
            image2: photo(201, 600),
            shin_cm: None,
            intermalleolar_cm: Some(10.0),
        };
        // shin 30 cm; before 200 px * 0.25 = 50 cm, after 50 px * 0.5 = 25 cm
        let env = svc.handle(&req).await;
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"status": "success", "result": [25.0, 25.0]})
        );

        // measured shin given directly takes precedence
        let req = MeasureRequest::LumbarFlexion {
            image1: photo(200, 600),
            image2: photo(201, 600),
            shin_cm: Some(60.0),
            intermalleolar_cm: Some(10.0),
        };
        let env = svc.handle(&req).await;
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"status": "success", "result": [50.0, 50.0]})
        );
    }

    #[tokio::test]
    async fn test_cervical_rotation_world() {
        let head = |width: u32, nose: RawKeypoint| {
            vec![
                layer(Backend::MediapipePose, width, 10, &[]),
                layer(
                    Backend::MediapipeWorld,
                    width,
                    10,
                    &[
                        (0, nose),
                        (11, RawKeypoint::new_3d(0.15, -0.4, 0.0)),
                        (12, RawKeypoint::new_3d(-0.15, -0.4, 0.0)),
                    ],
                ),
            ]
        };
        let stub = Arc::new(
            Stub::new(MEDIAPIPE)
                .on(10, head(10, RawKeypoint::new_3d(0.0, -0.6, -0.1)))
                .on(11, head(11, RawKeypoint::new_3d(-0.1, -0.55, 0.0))),
        );
        let svc = service(vec![stub], RoutingConfig::default());

        let req = MeasureRequest::CervicalRotation {
            side: Side::Right,
            image1: photo(10, 10),
            image2: photo(11, 10),
        };
        assert!((scalar(&svc.handle(&req).await) - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_intermalleolar_metric() {
        let world = layer(
            Backend::MediapipeWorld,
            12,
            12,
            &[
                (27, RawKeypoint::new_3d(-0.05, 0.9, 0.01)),
                (28, RawKeypoint::new_3d(0.05, 0.9, 0.01)),
            ],
        );
        let stub = Arc::new(Stub::new(MEDIAPIPE).on(12, vec![layer(Backend::MediapipePose, 12, 12, &[]), world]));
        let svc = service(vec![stub], RoutingConfig::default());

        let req = MeasureRequest::IntermalleolarDistance { image: photo(12, 12), shin_cm: None };
        assert!((scalar(&svc.handle(&req).await) - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tragus_depth_proxy() {
        let h36m = layer(
            Backend::Human3d,
            16,
            16,
            &[
                (8, RawKeypoint::new_3d(0.0, -0.03, 1.5)),
                (10, RawKeypoint::new_3d(0.0, 0.12, 1.7)),
            ],
        );
        let stub = Arc::new(Stub::new(&[Backend::Human3d]).on(16, vec![h36m]));
        let svc = service(vec![stub], RoutingConfig::default());

        let req = MeasureRequest::TragusToWall { side: Side::Left, image: photo(16, 16), wall_x: None };
        assert!((scalar(&svc.handle(&req).await) - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tragus_wall_boundary() {
        // shoulder-toe 700 px against 1.4 m in the world layer: 0.2 cm/px.
        // The pose layer leaves the image size out; the decoded photo supplies it.
        let pose = layer(
            Backend::MediapipePose,
            0,
            0,
            &[
                (7, RawKeypoint::new(0.8, 0.1)),
                (11, RawKeypoint::new(0.5, 0.2)),
                (31, RawKeypoint::new(0.5, 0.9)),
            ],
        );
        let world = layer(
            Backend::MediapipeWorld,
            100,
            1000,
            &[
                (11, RawKeypoint::new_3d(0.0, -0.5, 0.0)),
                (31, RawKeypoint::new_3d(0.0, 0.9, 0.0)),
            ],
        );
        let stub = Arc::new(Stub::new(MEDIAPIPE).on(100, vec![pose, world]));
        let svc = service(vec![Arc::clone(&stub)], RoutingConfig::default());

        // ear at x = 80 px, wall at 30 px
        let req = MeasureRequest::TragusToWall {
            side: Side::Left,
            image: photo(100, 1000),
            wall_x: Some(30.0),
        };
        assert!((scalar(&svc.handle(&req).await) - 10.0).abs() < 1e-9);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_intermalleolar_measured_shin() {
        // world shin 0.5 units; measured at 40 cm the layer's own metres are ignored
        let world = layer(
            Backend::MediapipeWorld,
            13,
            13,
            &[
                (25, RawKeypoint::new_3d(-0.05, 0.4, 0.0)),
                (27, RawKeypoint::new_3d(-0.05, 0.9, 0.0)),
                (28, RawKeypoint::new_3d(0.05, 0.9, 0.0)),
            ],
        );
        let stub = Arc::new(Stub::new(MEDIAPIPE).on(13, vec![layer(Backend::MediapipePose, 13, 13, &[]), world]));
        let svc = service(vec![stub], RoutingConfig::default());

        let req = MeasureRequest::IntermalleolarDistance { image: photo(13, 13), shin_cm: Some(40.0) };
        assert!((scalar(&svc.handle(&req).await) - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_lumbar_world_shin() {
        // knee-ankle 500 px in both photos, fingertips 400 px then 200 px above the ankles
        let pose = |width: u32, tip_y: f64| {
            layer(
                Backend::MediapipePose,
                width,
                1000,
                &[
                    (19, RawKeypoint::new(0.45, tip_y)),
                    (20, RawKeypoint::new(0.55, tip_y)),
                    (25, RawKeypoint::new(0.45, 0.4)),
                    (27, RawKeypoint::new(0.45, 0.9)),
                    (28, RawKeypoint::new(0.55, 0.9)),
                ],
            )
        };
        // shin 0.5 m in the before photo only: 0.1 cm/px
        let world = layer(
            Backend::MediapipeWorld,
            300,
            1000,
            &[
                (25, RawKeypoint::new_3d(-0.05, 0.4, 0.0)),
                (27, RawKeypoint::new_3d(-0.05, 0.9, 0.0)),
            ],
        );
        let stub = Arc::new(
            Stub::new(MEDIAPIPE)
                .on(300, vec![pose(300, 0.5), world])
                .on(301, vec![pose(301, 0.7)]),
        );
        let svc = service(vec![Arc::clone(&stub)], RoutingConfig::default());

        let req = MeasureRequest::LumbarFlexion {
            image1: photo(300, 1000),
            image2: photo(301, 1000),
            shin_cm: None,
            intermalleolar_cm: None,
        };
        let env = svc.handle(&req).await;
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"status": "success", "result": [20.0, 20.0]})
        );
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_detection_every_metric() {
        let stub = Arc::new(Stub::new(&[
            Backend::MediapipePose,
            Backend::MediapipeWorld,
            Backend::Human3d,
        ]));
        let svc = service(vec![stub], RoutingConfig::default());

        let requests = [
            MeasureRequest::TragusToWall { side: Side::Left, image: photo(4, 4), wall_x: None },
            MeasureRequest::TragusToWall { side: Side::Right, image: photo(4, 4), wall_x: Some(1.0) },
            MeasureRequest::SideFlexion { side: Side::Left, image1: photo(4, 4), image2: photo(4, 4) },
            MeasureRequest::LumbarFlexion {
                image1: photo(4, 4),
                image2: photo(4, 4),
                shin_cm: Some(40.0),
                intermalleolar_cm: None,
            },
            MeasureRequest::CervicalRotation { side: Side::Right, image1: photo(4, 4), image2: photo(4, 4) },
            MeasureRequest::IntermalleolarDistance { image: photo(4, 4), shin_cm: None },
        ];
        for req in &requests {
            assert_eq!(svc.handle(req).await, Envelope::error("NoBodyDetected"), "{:?}", req.metric());
        }
    }

    #[tokio::test]
    async fn test_missing_image_data() {
        let stub = Arc::new(Stub::new(MEDIAPIPE));
        let svc = service(vec![Arc::clone(&stub)], RoutingConfig::default());

        let req = MeasureRequest::SideFlexion { side: Side::Left, image1: photo(4, 4), image2: None };
        assert_eq!(svc.handle(&req).await, Envelope::error("No image data received"));
        let req = MeasureRequest::IntermalleolarDistance { image: Some(String::new()), shin_cm: None };
        assert_eq!(svc.handle(&req).await, Envelope::error("No image data received"));
        // nothing reached the backend
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_unavailable() {
        let svc = service(vec![Arc::new(Stub::new(MEDIAPIPE))], RoutingConfig::default());
        let req = MeasureRequest::TragusToWall { side: Side::Left, image: photo(4, 4), wall_x: None };
        assert_eq!(
            svc.handle(&req).await,
            Envelope::error("BackendUnavailable: no provider registered for human3d")
        );
    }
}
