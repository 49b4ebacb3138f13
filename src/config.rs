use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

/// Runtime configuration. Every knob can come from a `Config` file or from
/// the environment (`SOURCE_DIR`, `ENABLE_YEAR_PREFIX`, ...); `.env` files
/// are loaded by `main` before this runs.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
    #[serde(default = "default_dest_dir")]
    pub dest_dir: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default)]
    pub enable_year_prefix: bool,
    #[serde(default = "default_true")]
    pub enable_drive_suffix: bool,
    #[serde(default = "default_drive_suffix")]
    pub drive_suffix: String,
    #[serde(default)]
    pub force_recopy: bool,
    /// Seconds between periodic full rescans. 0 disables the timer; the
    /// startup scan always runs.
    #[serde(default)]
    pub rescan_interval: u64,
    #[serde(default)]
    pub use_s3_source: bool,
    #[serde(default)]
    pub s3_bucket: String,
    #[serde(default)]
    pub s3_prefix: String,
    #[serde(default)]
    pub s3_region: Option<String>,
    #[serde(default)]
    pub s3_endpoint_url: Option<String>,
    #[serde(default)]
    pub s3_access_key: Option<String>,
    #[serde(default)]
    pub s3_secret_key: Option<String>,
    /// Seconds between remote listing polls when the S3 source is active.
    #[serde(default = "default_s3_poll_interval")]
    pub s3_poll_interval: u64,
}

fn default_source_dir() -> String {
    "source".to_string()
}

fn default_dest_dir() -> String {
    "destination".to_string()
}

fn default_history_file() -> String {
    "turbosort_history.json".to_string()
}

fn default_drive_suffix() -> String {
    "1_DRIVE".to_string()
}

fn default_true() -> bool {
    true
}

fn default_s3_poll_interval() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            source_dir: default_source_dir(),
            dest_dir: default_dest_dir(),
            history_file: default_history_file(),
            enable_year_prefix: false,
            enable_drive_suffix: true,
            drive_suffix: default_drive_suffix(),
            force_recopy: false,
            rescan_interval: 0,
            use_s3_source: false,
            s3_bucket: String::new(),
            s3_prefix: String::new(),
            s3_region: None,
            s3_endpoint_url: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_poll_interval: default_s3_poll_interval(),
        }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::default().try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    /// Startup validation. Failures here are fatal; everything past this
    /// point is absorbed by the scan loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_s3_source && self.s3_bucket.trim().is_empty() {
            return Err(ConfigError::Message(
                "USE_S3_SOURCE is set but S3_BUCKET is empty".to_string(),
            ));
        }
        if self.rescan_interval == 0 && self.use_s3_source && self.s3_poll_interval == 0 {
            return Err(ConfigError::Message(
                "S3 source needs a nonzero S3_POLL_INTERVAL or RESCAN_INTERVAL".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with credential fields masked, safe to print or log.
    pub fn redacted(&self) -> AppConfig {
        let mask = |value: &Option<String>| value.as_ref().map(|_| "********".to_string());
        AppConfig {
            s3_access_key: mask(&self.s3_access_key),
            s3_secret_key: mask(&self.s3_secret_key),
            ..self.clone()
        }
    }
}
