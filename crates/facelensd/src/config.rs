use facelens_core::matcher::DEFAULT_DISTANCE_THRESHOLD;
use facelens_core::{DetectorKind, Dimensions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Images enrolled for a label when the identities file gives no count.
pub const DEFAULT_IMAGES_PER_LABEL: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read identities file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid identities file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("identities file {0} lists no identities")]
    NoIdentities(PathBuf),
}

/// One enrolled person and how many reference images to read for them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub label: String,
    #[serde(default = "default_images")]
    pub images: usize,
}

fn default_images() -> usize {
    DEFAULT_IMAGES_PER_LABEL
}

impl Identity {
    pub fn new(label: impl Into<String>, images: usize) -> Self {
        Self {
            label: label.into(),
            images,
        }
    }

    /// `<root>/<label>/<index>.jpg`, index starting at 1.
    pub fn image_path(&self, root: &Path, index: usize) -> PathBuf {
        root.join(&self.label).join(format!("{index}.jpg"))
    }
}

#[derive(Debug, Deserialize)]
struct IdentitiesFile {
    #[serde(default, rename = "identity")]
    identities: Vec<Identity>,
}

/// Parse an identities TOML document (`[[identity]]` tables).
pub fn parse_identities(source: &str, path: &Path) -> Result<Vec<Identity>, ConfigError> {
    let file: IdentitiesFile = toml::from_str(source).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if file.identities.is_empty() {
        return Err(ConfigError::NoIdentities(path.to_path_buf()));
    }
    Ok(file.identities)
}

fn default_identities() -> Vec<Identity> {
    vec![Identity::new("Luke", 8), Identity::new("Nico", 7)]
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the four ONNX model files.
    pub model_dir: PathBuf,
    /// Root of the labeled reference images.
    pub images_root: PathBuf,
    /// Enrolled identities, in display order.
    pub identities: Vec<Identity>,
    /// Euclidean distance below which a face matches a label.
    pub distance_threshold: f32,
    /// Cadence of the detect-and-render loop.
    pub tick_interval: Duration,
    /// Detector used by the live loop.
    pub live_detector: DetectorKind,
    /// Detector used on reference images.
    pub reference_detector: DetectorKind,
    /// Overlay size; defaults to the video size.
    pub display_size: Option<Dimensions>,
    /// Where to write the overlay PNG after each tick, if anywhere.
    pub overlay_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: facelens_core::default_model_dir(),
            images_root: PathBuf::from("face-api/labeled_images"),
            identities: default_identities(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            tick_interval: Duration::from_millis(100),
            live_detector: DetectorKind::Accurate,
            reference_detector: DetectorKind::Accurate,
            display_size: None,
            overlay_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `FACELENS_*` environment variables with defaults.
    ///
    /// Only the identities file can fail: a named file that is missing or
    /// malformed is a startup error rather than a silent fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let identities = match std::env::var("FACELENS_IDENTITIES") {
            Ok(path) => {
                let path = PathBuf::from(path);
                let source = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                parse_identities(&source, &path)?
            }
            Err(_) => defaults.identities,
        };

        Ok(Self {
            camera_device: std::env::var("FACELENS_CAMERA_DEVICE")
                .unwrap_or(defaults.camera_device),
            model_dir: env_path("FACELENS_MODEL_DIR").unwrap_or(defaults.model_dir),
            images_root: env_path("FACELENS_IMAGES_ROOT").unwrap_or(defaults.images_root),
            identities,
            distance_threshold: env_parse("FACELENS_DISTANCE_THRESHOLD", defaults.distance_threshold),
            tick_interval: Duration::from_millis(env_parse("FACELENS_TICK_MS", 100u64).max(1)),
            live_detector: env_parse("FACELENS_LIVE_DETECTOR", defaults.live_detector),
            reference_detector: env_parse("FACELENS_REFERENCE_DETECTOR", defaults.reference_detector),
            display_size: parse_setting(
                "FACELENS_DISPLAY_SIZE",
                std::env::var("FACELENS_DISPLAY_SIZE").ok(),
                parse_dimensions,
            ),
            overlay_path: env_path("FACELENS_OVERLAY_PATH"),
        })
    }
}

/// Parse `WIDTHxHEIGHT`, e.g. `640x480`.
pub fn parse_dimensions(value: &str) -> Option<Dimensions> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    (width > 0 && height > 0).then(|| Dimensions::new(width, height))
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_setting(key, std::env::var(key).ok(), |v| v.parse().ok()).unwrap_or(default)
}

/// Parse a raw setting; a value that is set but unparsable is logged and dropped.
fn parse_setting<T>(key: &str, raw: Option<String>, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = raw?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unparsable setting");
    }
    parsed
}
