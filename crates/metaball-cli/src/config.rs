//! Pipeline configuration – reads `metaball.toml`.
//!
//! Every field has a default, so an absent file or an empty section is
//! valid.  Unknown keys are rejected so typos fail loudly at startup.

use metaball_perception::{EulerConvention, FilterMode, FrameTransform};
use metaball_types::MetaballError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default publish port for `metaball collect`.
pub const COLLECT_PORT: u16 = 5555;
/// Default publish port for `metaball run`.
pub const DEPLOY_PORT: u16 = 6666;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetaballConfig {
    pub publisher: PublisherConfig,
    pub camera: CameraConfig,
    pub filter: FilterConfig,
    pub transform: TransformConfig,
    pub model: ModelConfig,
    pub force_sensor: ForceSensorConfig,
    pub recording: RecordingConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublisherConfig {
    /// `*` binds every interface.
    pub host: String,
    /// When unset the command picks [`COLLECT_PORT`] or [`DEPLOY_PORT`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            host: "*".to_string(),
            port: None,
        }
    }
}

impl PublisherConfig {
    /// `tcp://host:port`, bracketing IPv6 literals.
    pub fn address(&self, default_port: u16) -> String {
        let port = self.port.unwrap_or(default_port);
        if self.host.contains(':') {
            format!("tcp://[{}]:{}", self.host, port)
        } else {
            format!("tcp://{}:{}", self.host, port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    pub id: String,
    /// Frame rate of the simulated camera; `0` reads as fast as possible.
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: usize,
    pub initial_samples: usize,
    pub max_initial_attempts: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: "sim-camera".to_string(),
            fps: 60.0,
            width: 320,
            height: 240,
            warmup_frames: 5,
            initial_samples: 10,
            max_initial_attempts: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub enabled: bool,
    pub window: usize,
    pub mode: FilterMode,
    pub jump_gate: bool,
    pub jump_threshold: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: metaball_perception::filter::DEFAULT_WINDOW,
            mode: FilterMode::MovingAverage,
            jump_gate: true,
            jump_threshold: metaball_perception::filter::DEFAULT_JUMP_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Row-major basis change applied after zeroing.
    pub axis_remap: [[f64; 3]; 3],
    pub convention: EulerConvention,
}

impl Default for TransformConfig {
    fn default() -> Self {
        let m = FrameTransform::default_axis_remap();
        let mut rows = [[0.0; 3]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = m[(r, c)];
            }
        }
        Self {
            axis_remap: rows,
            convention: EulerConvention::IntrinsicXyz,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// JSON file of a linear force model.  No model means zero force/node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Length of the zero node vector published without a model.
    pub node_dim: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            node_dim: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForceSensorConfig {
    /// Attach the (simulated) sensor in `collect`.
    pub enabled: bool,
    pub id: String,
    /// Sensor → global rotation, row-major.
    pub rotation: [[f64; 3]; 3],
    /// Sensor origin in the global frame.
    pub translation: [f64; 3],
}

impl Default for ForceSensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            id: "sim-ft".to_string(),
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordingConfig {
    pub data_dir: PathBuf,
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            queue_capacity: metaball_runtime::queue::DEFAULT_QUEUE_CAPACITY,
            poll_interval_ms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Per-worker join deadline.
    pub join_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 1000,
        }
    }
}

/// Load `path` and apply `METABALL_*` overrides.
pub fn load(path: &Path) -> Result<MetaballConfig, MetaballError> {
    let mut cfg = load_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the file at `path`.  A missing file yields the defaults.
pub(crate) fn load_from(path: &Path) -> Result<MetaballConfig, MetaballError> {
    if !path.exists() {
        return Ok(MetaballConfig::default());
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        MetaballError::Configuration(format!("failed to read config at {}: {}", path.display(), e))
    })?;
    parse(&raw)
}

pub(crate) fn parse(raw: &str) -> Result<MetaballConfig, MetaballError> {
    toml::from_str(raw).map_err(|e| MetaballError::Configuration(format!("failed to parse config: {}", e)))
}

/// Apply `METABALL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `METABALL_PUBLISH_HOST` | `publisher.host` |
/// | `METABALL_PUBLISH_PORT` | `publisher.port` |
/// | `METABALL_MODEL_PATH` | `model.path` |
/// | `METABALL_DATA_DIR` | `recording.data_dir` |
pub fn apply_env_overrides(cfg: &mut MetaballConfig) {
    if let Ok(v) = std::env::var("METABALL_PUBLISH_HOST") {
        cfg.publisher.host = v;
    }
    if let Ok(v) = std::env::var("METABALL_PUBLISH_PORT")
        && let Ok(port) = v.parse::<u16>() {
            cfg.publisher.port = Some(port);
        }
    if let Ok(v) = std::env::var("METABALL_MODEL_PATH") {
        cfg.model.path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("METABALL_DATA_DIR") {
        cfg.recording.data_dir = PathBuf::from(v);
    }
}
