use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::YoloParams;
use crate::ingest::CaptureConfig;

pub const DEFAULT_TOPIC: &str = "detected_fruit";
pub const DEFAULT_QUEUE_DEPTH: usize = 10;
pub const DEFAULT_TICK_PERIOD_MS: u64 = 100;
const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_CLIENT_ID: &str = "yolo_publisher";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NodeConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    publisher: Option<PublisherConfigFile>,
    display: Option<DisplayConfigFile>,
    tick_period_ms: Option<u64>,
    max_consecutive_read_failures: Option<u32>,
    stats_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<String>,
    labels_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PublisherConfigFile {
    topic: Option<String>,
    queue_depth: Option<usize>,
    broker_addr: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    connect_timeout_ms: Option<u64>,
    tls_ca_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    snapshot_path: Option<PathBuf>,
}

/// Fully resolved node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub model: ModelSettings,
    pub camera: CaptureConfig,
    pub publisher: PublisherSettings,
    /// Where annotated frames are written. `None` disables the display surface.
    pub snapshot_path: Option<PathBuf>,
    pub tick_period: Duration,
    /// Consecutive failed reads before the node gives up. `0` never gives up.
    pub max_consecutive_read_failures: u32,
    pub stats_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// ONNX model path, or `stub://<name>` for the stub backend. Required.
    pub path: String,
    pub labels_path: Option<PathBuf>,
    pub params: YoloParams,
}

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub topic: String,
    pub queue_depth: usize,
    pub broker_addr: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub tls_ca_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_file(NodeConfigFile::default())
    }
}

impl NodeConfig {
    /// Load configuration from `DETECTOR_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECTOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: NodeConfigFile) -> Self {
        let model_file = file.model.unwrap_or_default();
        let defaults = YoloParams::default();
        let model = ModelSettings {
            path: model_file.path.unwrap_or_default(),
            labels_path: model_file.labels_path,
            params: YoloParams {
                input_size: model_file.input_size.unwrap_or(defaults.input_size),
                confidence_threshold: model_file
                    .confidence_threshold
                    .unwrap_or(defaults.confidence_threshold),
                iou_threshold: model_file.iou_threshold.unwrap_or(defaults.iou_threshold),
                max_detections: model_file.max_detections.unwrap_or(defaults.max_detections),
            },
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = CaptureConfig {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_HEIGHT),
            fourcc: *b"MJPG",
        };

        let publisher_file = file.publisher.unwrap_or_default();
        let publisher = PublisherSettings {
            topic: publisher_file
                .topic
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            queue_depth: publisher_file.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
            broker_addr: publisher_file
                .broker_addr
                .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string()),
            client_id: publisher_file
                .client_id
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            username: publisher_file.username,
            password: publisher_file.password,
            connect_timeout: Duration::from_millis(
                publisher_file
                    .connect_timeout_ms
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            tls_ca_path: publisher_file.tls_ca_path,
        };

        Self {
            model,
            camera,
            publisher,
            snapshot_path: file.display.and_then(|display| display.snapshot_path),
            tick_period: Duration::from_millis(
                file.tick_period_ms.unwrap_or(DEFAULT_TICK_PERIOD_MS),
            ),
            max_consecutive_read_failures: file.max_consecutive_read_failures.unwrap_or(0),
            stats_interval: Duration::from_secs(
                file.stats_interval_secs
                    .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("DETECTOR_MODEL_PATH") {
            self.model.path = path;
        }
        if let Some(path) = env_nonempty("DETECTOR_LABELS_PATH") {
            self.model.labels_path = Some(PathBuf::from(path));
        }
        if let Some(device) = env_nonempty("DETECTOR_DEVICE") {
            self.camera.device = device;
        }
        if let Some(topic) = env_nonempty("DETECTOR_TOPIC") {
            self.publisher.topic = topic;
        }
        if let Some(addr) = env_nonempty("MQTT_BROKER_ADDR") {
            self.publisher.broker_addr = addr;
        }
        if let Some(client_id) = env_nonempty("MQTT_CLIENT_ID") {
            self.publisher.client_id = client_id;
        }
        if let Some(username) = env_nonempty("MQTT_USERNAME") {
            self.publisher.username = Some(username);
        }
        if let Some(password) = env_nonempty("MQTT_PASSWORD") {
            self.publisher.password = Some(password);
        }
        if let Some(path) = env_nonempty("DETECTOR_SNAPSHOT_PATH") {
            self.snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(limit) = env_nonempty("DETECTOR_MAX_READ_FAILURES") {
            self.max_consecutive_read_failures = limit.parse().map_err(|_| {
                anyhow!("DETECTOR_MAX_READ_FAILURES must be a non-negative integer")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.model.path.trim().is_empty() {
            return Err(anyhow!(
                "model path is required (set model.path or DETECTOR_MODEL_PATH)"
            ));
        }
        let params = &self.model.params;
        if !(0.0..=1.0).contains(&params.confidence_threshold) {
            return Err(anyhow!("model confidence_threshold must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&params.iou_threshold) {
            return Err(anyhow!("model iou_threshold must be within 0..=1"));
        }
        if params.input_size == 0 || params.max_detections == 0 {
            return Err(anyhow!(
                "model input_size and max_detections must be greater than zero"
            ));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        validate_topic(&self.publisher.topic)?;
        if self.publisher.queue_depth == 0 {
            return Err(anyhow!("publisher queue_depth must be greater than zero"));
        }
        if self.publisher.client_id.trim().is_empty() {
            return Err(anyhow!("publisher client_id must not be empty"));
        }
        if self.tick_period.is_zero() {
            return Err(anyhow!("tick_period_ms must be greater than zero"));
        }
        if self.stats_interval.is_zero() {
            return Err(anyhow!("stats_interval_secs must be greater than zero"));
        }
        Ok(())
    }
}

/// Publish topics must be non-empty and free of MQTT wildcards.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(anyhow!("publish topic must not be empty"));
    }
    if topic.contains(['#', '+']) || topic.contains('\0') {
        return Err(anyhow!(
            "publish topic '{}' must not contain wildcards or NUL",
            topic
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<NodeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_node_contract() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.publisher.topic, "detected_fruit");
        assert_eq!(cfg.publisher.queue_depth, 10);
        assert_eq!(cfg.tick_period, Duration::from_millis(100));
        assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
        assert_eq!(&cfg.camera.fourcc, b"MJPG");
        assert_eq!(cfg.max_consecutive_read_failures, 0);
        assert!(cfg.snapshot_path.is_none());
    }

    #[test]
    fn model_path_has_no_default() {
        let mut cfg = NodeConfig::default();
        assert!(cfg.model.path.is_empty());
        let err = cfg.validate().expect_err("missing model must fail");
        assert!(err.to_string().contains("DETECTOR_MODEL_PATH"));

        cfg.model.path = "/opt/models/best.onnx".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn topic_validation_rejects_wildcards() {
        assert!(validate_topic("detected_fruit").is_ok());
        assert!(validate_topic("robot/detected_fruit").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("fruit/#").is_err());
        assert!(validate_topic("fruit/+/best").is_err());
    }

    #[test]
    fn validate_rejects_zero_period() {
        let mut cfg = NodeConfig::default();
        cfg.model.path = "stub://fruit".to_string();
        cfg.tick_period = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = NodeConfig::default();
        cfg.model.path = "stub://fruit".to_string();
        cfg.model.params.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}
