//! In-process MoveNet (ONNX Runtime), 17 COCO keypoints.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::adapter::{RawDetection, RawKeypoint};
use super::backend::PoseBackend;
use super::topology::Backend;
use crate::imaging::DecodedImage;

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: u32 = 192;

const KEYPOINT_COUNT: usize = 17;

/// Mean keypoint confidence below which the frame counts as empty
const MIN_POSE_SCORE: f64 = 0.2;

/// MoveNet を使用した姿勢検出器
pub struct MoveNetDetector {
    session: Arc<Mutex<Session>>,
}

impl MoveNetDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }

    fn run(session: &Mutex<Session>, input: Array4<f32>) -> Result<Vec<RawKeypoint>> {
        let mut session = session
            .lock()
            .map_err(|_| anyhow!("MoveNet session poisoned"))?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // MoveNet の出力は [1, 1, 17, 3] (y, x, confidence)
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        Ok((0..KEYPOINT_COUNT)
            .map(|i| {
                let y = output[[0, 0, i, 0]] as f64;
                let x = output[[0, 0, i, 1]] as f64;
                let confidence = output[[0, 0, i, 2]] as f64;
                RawKeypoint::new(x, y).with_score(confidence)
            })
            .collect())
    }
}

/// 画像を MoveNet用の入力テンソルに変換
///
/// - RGB, 192x192 にリサイズ
/// - [1, 192, 192, 3] の f32 テンソル (0.0-255.0)
pub fn preprocess_for_movenet(image: &DecodedImage) -> Array4<f32> {
    let size = MOVENET_INPUT_SIZE;
    let resized = image
        .pixels()
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let n = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, n, n, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32;
        }
    }
    tensor
}

#[async_trait]
impl PoseBackend for MoveNetDetector {
    fn name(&self) -> &str {
        "movenet-onnx"
    }

    fn provides(&self) -> &[Backend] {
        &[Backend::Movenet]
    }

    async fn infer(&self, image: &DecodedImage) -> Result<Vec<RawDetection>> {
        let input = preprocess_for_movenet(image);
        let session = Arc::clone(&self.session);
        let keypoints = tokio::task::spawn_blocking(move || Self::run(&session, input))
            .await
            .context("MoveNet task panicked")??;

        // single-pose MoveNet always answers; low overall confidence means nobody there
        let mean = keypoints.iter().filter_map(|k| k.score).sum::<f64>() / KEYPOINT_COUNT as f64;
        let keypoints = if mean < MIN_POSE_SCORE { Vec::new() } else { keypoints };

        Ok(vec![RawDetection {
            backend: Backend::Movenet,
            keypoints,
            image_width: image.width(),
            image_height: image.height(),
        }])
    }
}
