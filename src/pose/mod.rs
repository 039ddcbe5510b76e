pub mod adapter;
pub mod backend;
#[cfg(feature = "onnx")]
pub mod detector;
pub mod keypoint;
pub mod remote;
pub mod topology;

pub use adapter::{LandmarkAdapter, RawDetection, RawKeypoint};
pub use backend::{BackendRegistry, PoseBackend};
#[cfg(feature = "onnx")]
pub use detector::MoveNetDetector;
pub use keypoint::{CanonicalLandmarkSet, LandmarkPoint, Role, Side};
pub use remote::RemoteBackend;
pub use topology::{Axis, Backend, CoordinateSpace, Topology};
