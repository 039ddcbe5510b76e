//! Wire protocol: measurement requests from clients and inference requests to the pose
//! sidecar, both JSON over length-delimited TCP frames.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::pose::{Backend, RawDetection, Side};
use crate::report::MetricKind;

// --- Client → server ---

/// One request per clinical metric. Image fields carry base64 (JPEG/PNG).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "kebab-case")]
pub enum MeasureRequest {
    TragusToWall {
        side: Side,
        image: Option<String>,
        /// Wall boundary column in pixels, when the client detected one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wall_x: Option<f64>,
    },
    SideFlexion {
        side: Side,
        image1: Option<String>,
        image2: Option<String>,
    },
    LumbarFlexion {
        image1: Option<String>,
        image2: Option<String>,
        /// Measured shin (knee–ankle) length
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shin_cm: Option<f64>,
        /// Measured ankle-to-ankle distance, calibrates the shin on the first image
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intermalleolar_cm: Option<f64>,
    },
    CervicalRotation {
        side: Side,
        image1: Option<String>,
        image2: Option<String>,
    },
    IntermalleolarDistance {
        image: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shin_cm: Option<f64>,
    },
}

impl MeasureRequest {
    pub fn metric(&self) -> MetricKind {
        match self {
            MeasureRequest::TragusToWall { .. } => MetricKind::TragusToWall,
            MeasureRequest::SideFlexion { .. } => MetricKind::SideFlexion,
            MeasureRequest::LumbarFlexion { .. } => MetricKind::LumbarFlexion,
            MeasureRequest::CervicalRotation { .. } => MetricKind::CervicalRotation,
            MeasureRequest::IntermalleolarDistance { .. } => MetricKind::IntermalleolarDistance,
        }
    }
}

// --- Server → inference sidecar ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Encoded image, base64
    pub image: String,
    /// Layers wanted back
    pub backends: Vec<Backend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    #[serde(default)]
    pub error: Option<String>,
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Base64 images of two phone photos fit comfortably
const MAX_FRAME_LENGTH: usize = 32 * 1024 * 1024;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (JSON + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    let data = serde_json::to_vec(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive one raw frame; `None` when the peer closed the connection.
pub async fn recv_frame(stream: &mut MessageStream) -> anyhow::Result<Option<Bytes>> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bytes.freeze())),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match recv_frame(stream).await? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}
