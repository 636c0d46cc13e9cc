//! TraceVault vision crate - face detection and scene classification seams.
//!
//! The detection and classification models are heavyweight external
//! services loaded once per process and injected into the fan-out processor
//! as long-lived handles. This crate defines the service traits and the
//! mock implementations used in tests and local runs; no model runtime
//! lives in this repository.

pub mod face;
pub mod scene;

pub use face::{Detection, FaceDetector, MockFaceDetector};
pub use scene::{MockSceneClassifier, SceneClassifier};
