use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::pose::Backend;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// 待ち受けアドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// ログ出力先ディレクトリ
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// リクエストごとのメトリクスと処理時間をログに出す
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

fn default_listen_addr() -> String { "0.0.0.0:8000".to_string() }
fn default_log_dir() -> String { "logs".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_dir: default_log_dir(),
            verbose: false,
            adapter: AdapterConfig::default(),
            inference: InferenceConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    /// これ未満の信頼度のキーポイントは未検出扱い
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

fn default_min_score() -> f64 { 0.3 }

impl Default for AdapterConfig {
    fn default() -> Self {
        Self { min_score: default_min_score() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// 推論サーバー (空文字で無効)
    #[serde(default = "default_inference_addr")]
    pub addr: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 推論サーバーが返すレイヤー
    #[serde(default = "default_remote_layers")]
    pub layers: Vec<Backend>,
    /// MoveNet ONNX モデル (feature "onnx")
    #[serde(default)]
    pub onnx_model: Option<String>,
}

fn default_inference_addr() -> String { "127.0.0.1:9100".to_string() }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_remote_layers() -> Vec<Backend> {
    vec![Backend::MediapipePose, Backend::MediapipeWorld, Backend::Human3d]
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            addr: default_inference_addr(),
            timeout_ms: default_timeout_ms(),
            layers: default_remote_layers(),
            onnx_model: None,
        }
    }
}

/// Landmark layer used by each metric
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RoutingConfig {
    /// Tragus-to-wall with a wall boundary column (image layer)
    #[serde(default = "default_image_layer")]
    pub tragus_wall: Backend,
    /// Tragus-to-wall without a boundary, measured along depth
    #[serde(default = "default_depth_layer")]
    pub tragus_depth: Backend,
    #[serde(default = "default_image_layer")]
    pub side_flexion: Backend,
    #[serde(default = "default_image_layer")]
    pub lumbar_flexion: Backend,
    #[serde(default = "default_world_layer")]
    pub cervical_rotation: Backend,
    #[serde(default = "default_world_layer")]
    pub intermalleolar_distance: Backend,
    /// Metric layer that calibrates image layers of the same photo
    #[serde(default = "default_world_layer")]
    pub world: Backend,
}

fn default_image_layer() -> Backend { Backend::MediapipePose }
fn default_world_layer() -> Backend { Backend::MediapipeWorld }
fn default_depth_layer() -> Backend { Backend::Human3d }

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            tragus_wall: default_image_layer(),
            tragus_depth: default_depth_layer(),
            side_flexion: default_image_layer(),
            lumbar_flexion: default_image_layer(),
            cervical_rotation: default_world_layer(),
            intermalleolar_distance: default_world_layer(),
            world: default_world_layer(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Missing file → defaults; a broken file is reported and ignored
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }
}
