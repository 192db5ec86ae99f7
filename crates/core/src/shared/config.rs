use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::face_detector::DetectionParams;
use crate::shared::constants::{
    CAPTURE_PATH, DEFAULT_ACQUISITION_INTERVAL_MS, DEFAULT_DEVICE_URL, DEFAULT_HTTP_WORKERS,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_OUTPUT_PATH,
    DEFAULT_READY_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, OUTPUT_EXTENSIONS, REPORT_PATH,
    SAVED_PHOTO_PATH,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be an http(s) URL, got '{value}'")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("scale factor must be greater than 1.0, got {0}")]
    ScaleFactor(f64),
    #[error("confidence must be between 0.0 and 1.0, got {0}")]
    Confidence(f64),
    #[error("output path must end in one of: {}, got {}", OUTPUT_EXTENSIONS.join(", "), .0.display())]
    OutputExtension(PathBuf),
}

/// How captured images reach the ingestion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// The device uploads each capture to the ingestion endpoint.
    #[default]
    Push,
    /// The acquisition loop downloads the saved photo after each acknowledged capture.
    Pull,
}

/// Runtime settings for the bridge. Every field has a default, so a config
/// file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub capture_url: String,
    pub saved_photo_url: String,
    pub report_url: String,
    pub listen_addr: String,
    pub output_path: PathBuf,
    pub acquisition_interval_ms: u64,
    pub ready_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub http_workers: usize,
    pub max_payload_bytes: usize,
    pub delivery: DeliveryMode,
    pub detection: DetectionParams,
    pub model_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut config = Self {
            capture_url: String::new(),
            saved_photo_url: String::new(),
            report_url: String::new(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            acquisition_interval_ms: DEFAULT_ACQUISITION_INTERVAL_MS,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            http_workers: DEFAULT_HTTP_WORKERS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            delivery: DeliveryMode::Push,
            detection: DetectionParams::default(),
            model_path: None,
        };
        config.set_device_url(DEFAULT_DEVICE_URL);
        config
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Points all three device endpoints at one base URL.
    pub fn set_device_url(&mut self, base: &str) {
        let base = base.trim_end_matches('/');
        self.capture_url = format!("{base}{CAPTURE_PATH}");
        self.saved_photo_url = format!("{base}{SAVED_PHOTO_PATH}");
        self.report_url = format!("{base}{REPORT_PATH}");
    }

    pub fn acquisition_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("capture_url", &self.capture_url)?;
        check_url("report_url", &self.report_url)?;
        if self.delivery == DeliveryMode::Pull {
            check_url("saved_photo_url", &self.saved_photo_url)?;
        }
        if self.acquisition_interval_ms == 0 {
            return Err(ConfigError::Zero("acquisition_interval_ms"));
        }
        if self.ready_timeout_ms == 0 {
            return Err(ConfigError::Zero("ready_timeout_ms"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("request_timeout_ms"));
        }
        if self.http_workers == 0 {
            return Err(ConfigError::Zero("http_workers"));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Zero("max_payload_bytes"));
        }

        let d = &self.detection;
        if d.scale_factor.is_nan() || d.scale_factor <= 1.0 {
            return Err(ConfigError::ScaleFactor(d.scale_factor));
        }
        if d.min_width == 0 || d.min_height == 0 {
            return Err(ConfigError::Zero("detection min size"));
        }
        if !(0.0..=1.0).contains(&d.confidence) {
            return Err(ConfigError::Confidence(d.confidence));
        }

        let supported = self
            .output_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| OUTPUT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            return Err(ConfigError::OutputExtension(self.output_path.clone()));
        }
        Ok(())
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let ok = ["http://", "https://"]
        .iter()
        .any(|scheme| value.len() > scheme.len() && value.starts_with(scheme));
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        })
    }
}
