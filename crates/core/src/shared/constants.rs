pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const DEFAULT_DEVICE_URL: &str = "http://192.168.4.1";
pub const CAPTURE_PATH: &str = "/capture";
pub const SAVED_PHOTO_PATH: &str = "/saved-photo";
pub const REPORT_PATH: &str = "/face-detection";

pub const INGEST_ROUTE: &str = "/receive-image";
pub const STATIC_ROUTE_PREFIX: &str = "/static/";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_OUTPUT_PATH: &str = "static/processed_image.jpg";

pub const DEFAULT_ACQUISITION_INTERVAL_MS: u64 = 5_000;
/// Bounded readiness wait; keeps the processing loop responsive to shutdown.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HTTP_WORKERS: usize = 4;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound on unconsumed readiness events held by the frame slot.
pub const READINESS_CAPACITY: usize = 64;

/// Viewer page reload period in seconds.
pub const VIEWER_REFRESH_SECS: u32 = 1;

pub const OUTPUT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
