//! Detection publisher node
//!
//! Reads frames from a camera, runs an object detector on each frame, and
//! publishes the highest-confidence detection as `"<class> <confidence>"` text
//! on a topic at a fixed rate.
//!
//! # Module Structure
//!
//! - `node`: the detection loop controller (`DetectionNode`, `on_tick`), its
//!   tick timer and shutdown signal
//! - `ingest`: frame sources (V4L2 MJPEG capture, `stub://` synthetic source)
//! - `detect`: detector backends (tract ONNX, stub), class names, best-of
//!   reduction
//! - `transport`: publish channel (MQTT, in-memory)
//! - `display`: diagnostic annotated-frame output
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod node;
pub mod transport;

pub use config::{ModelSettings, NodeConfig, PublisherSettings};
pub use detect::{best_detection, ClassNames, Detection, DetectorBackend, RawDetection, StubBackend};
pub use display::{DisplaySurface, SnapshotDisplay};
pub use frame::Frame;
pub use ingest::{CaptureConfig, FrameSource, V4l2Source};
pub use node::signal::{ShutdownSignal, ShutdownTrigger};
pub use node::{on_tick, DetectionNode, NodeSettings, NodeState, TickOutcome, TickStats};
pub use transport::{MemoryPublisher, MemoryTopic, MqttPublisher, Publisher};
