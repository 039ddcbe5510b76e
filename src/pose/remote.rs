//! Pose inference delegated to a sidecar process over the framed JSON transport.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::adapter::RawDetection;
use super::backend::PoseBackend;
use super::topology::Backend;
use crate::imaging::{encode_base64, DecodedImage};
use crate::protocol::{self, InferenceRequest, InferenceResponse, MessageStream};

/// Connects lazily, serializes requests over one connection and drops the connection on
/// any failure so the next call reconnects.
pub struct RemoteBackend {
    addr: String,
    layers: Vec<Backend>,
    timeout: Duration,
    conn: Mutex<Option<MessageStream>>,
}

impl RemoteBackend {
    pub fn new(addr: impl Into<String>, layers: Vec<Backend>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            layers,
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<MessageStream> {
        let tcp = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("failed to connect to inference server {}", self.addr))?;
        tcp.set_nodelay(true)?;
        Ok(protocol::message_stream(tcp))
    }

    async fn round_trip(
        stream: &mut MessageStream,
        req: &InferenceRequest,
    ) -> Result<InferenceResponse> {
        protocol::send_message(stream, req).await?;
        protocol::recv_message(stream).await
    }
}

#[async_trait]
impl PoseBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn provides(&self) -> &[Backend] {
        &self.layers
    }

    async fn infer(&self, image: &DecodedImage) -> Result<Vec<RawDetection>> {
        let req = InferenceRequest {
            image: encode_base64(image.encoded()),
            backends: self.layers.clone(),
        };

        let mut guard = self.conn.lock().await;
        let mut stream = match guard.take() {
            Some(s) => s,
            None => tokio::time::timeout(self.timeout, self.connect())
                .await
                .context("inference server connect timed out")??,
        };

        let resp = tokio::time::timeout(self.timeout, Self::round_trip(&mut stream, &req))
            .await
            .context("inference timed out")??;
        // healthy connection goes back for the next request
        *guard = Some(stream);

        if let Some(err) = resp.error {
            bail!("inference server: {}", err);
        }
        Ok(resp.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::tests::png_bytes;
    use crate::pose::RawKeypoint;

    async fn serve_once(listener: tokio::net::TcpListener, error: Option<String>) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut stream = protocol::message_stream(tcp);
        while let Ok(req) = protocol::recv_message::<InferenceRequest>(&mut stream).await {
            let detections = req
                .backends
                .iter()
                .map(|&b| RawDetection {
                    backend: b,
                    keypoints: vec![RawKeypoint::new(0.5, 0.5); 33],
                    image_width: 8,
                    image_height: 8,
                })
                .collect();
            let resp = InferenceResponse { detections, error: error.clone() };
            protocol::send_message(&mut stream, &resp).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_remote_infer_reuses_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(serve_once(listener, None));

        let backend = RemoteBackend::new(
            addr,
            vec![Backend::MediapipePose, Backend::MediapipeWorld],
            Duration::from_secs(5),
        );
        let image = DecodedImage::from_bytes(png_bytes(8, 8)).unwrap();

        for _ in 0..2 {
            let detections = backend.infer(&image).await.unwrap();
            assert_eq!(detections.len(), 2);
            assert_eq!(detections[0].keypoints.len(), 33);
        }
        drop(backend);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve_once(listener, Some("model not loaded".into())));

        let backend = RemoteBackend::new(addr, vec![Backend::Human3d], Duration::from_secs(5));
        let image = DecodedImage::from_bytes(png_bytes(4, 4)).unwrap();
        let err = backend.infer(&image).await.unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // bind then drop to get a free port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let backend = RemoteBackend::new(addr, vec![Backend::Movenet], Duration::from_secs(2));
        let image = DecodedImage::from_bytes(png_bytes(4, 4)).unwrap();
        assert!(backend.infer(&image).await.is_err());
    }
}
