//! yolo_publisher - camera detection node
//!
//! This daemon:
//! 1. Opens the `detected_fruit` publish channel on the MQTT broker
//! 2. Loads the detection model
//! 3. Opens the camera (MJPEG, 1280x720)
//! 4. Every 100 ms publishes the best detection of the latest frame
//! 5. Releases camera, display and channel on SIGINT/SIGTERM
//!
//! Configuration: `DETECTOR_CONFIG` (JSON or TOML file) plus environment
//! overrides, see `NodeConfig::load`.

use anyhow::Result;

use detection_publisher::{DetectionNode, NodeConfig, ShutdownSignal};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = NodeConfig::load()?;
    log::info!(
        "yolo_publisher {}: model={} device={} broker={} topic={}",
        env!("CARGO_PKG_VERSION"),
        cfg.model.path,
        cfg.camera.device,
        cfg.publisher.broker_addr,
        cfg.publisher.topic
    );

    let mut shutdown = ShutdownSignal::new();
    shutdown.install_ctrlc()?;

    let mut node = DetectionNode::from_config(&cfg)?;
    log::info!("YOLO publisher started");

    node.spin(&mut shutdown)?;
    log::info!("yolo_publisher stopped");
    Ok(())
}
