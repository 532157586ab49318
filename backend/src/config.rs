use std::env;
use std::time::Duration;

/// Service configuration, read once from the environment at startup and
/// passed to handlers via `web::Data` instead of ambient globals.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub upload_dir: String,
    pub result_dir: String,
    pub max_payload_bytes: usize,
    pub pipeline_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let result_dir = env::var("RESULT_DIR").unwrap_or_else(|_| "results".to_string());
        let max_payload_bytes = env::var("MAX_PAYLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(16 * 1024 * 1024);
        let timeout_secs = env::var("PIPELINE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            port,
            upload_dir,
            result_dir,
            max_payload_bytes,
            pipeline_timeout: Duration::from_secs(timeout_secs),
        }
    }
}
