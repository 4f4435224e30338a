//! Engine and adapter configuration loaded from environment variables.

use std::path::PathBuf;

/// Configuration error raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

pub(crate) fn var_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

pub(crate) fn opt_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `name` with `FromStr`, falling back to `default` when unset.
pub fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match opt_var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value,
        }),
    }
}

/// Settings every pipeline shares.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bucket holding sources and results.
    pub bucket: String,
    /// Root directory for staged temp files. Created on demand.
    pub temp_dir: PathBuf,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var       | Default                       |
    /// |---------------|-------------------------------|
    /// | `BLOB_BUCKET` | required                      |
    /// | `TEMP_DIR`    | `<system temp>/mediaq`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        let bucket = opt_var("BLOB_BUCKET").ok_or(ConfigError::Missing("BLOB_BUCKET"))?;
        let temp_dir = opt_var("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("mediaq"));
        Ok(Self { bucket, temp_dir })
    }
}

/// Paths of the external tools the adapters invoke.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Detection sidecar executable.
    pub detector_path: PathBuf,
}

impl ToolConfig {
    /// | Env Var         | Default       |
    /// |-----------------|---------------|
    /// | `FFMPEG_PATH`   | `ffmpeg`      |
    /// | `FFPROBE_PATH`  | `ffprobe`     |
    /// | `DETECTOR_PATH` | `mediaq-detect` |
    pub fn from_env() -> Self {
        Self {
            ffmpeg_path: var_or("FFMPEG_PATH", "ffmpeg").into(),
            ffprobe_path: var_or("FFPROBE_PATH", "ffprobe").into(),
            detector_path: var_or("DETECTOR_PATH", "mediaq-detect").into(),
        }
    }
}

/// Connection settings for an S3-compatible blob store.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint, e.g. a local MinIO. `None` uses AWS.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl S3Config {
    /// | Env Var             | Default                  |
    /// |---------------------|--------------------------|
    /// | `S3_REGION`         | `us-east-1`              |
    /// | `S3_ENDPOINT`       | unset                    |
    /// | `S3_ACCESS_KEY`     | unset (default chain)    |
    /// | `S3_SECRET_KEY`     | unset (default chain)    |
    /// | `S3_PATH_STYLE`     | `true` if endpoint set   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = opt_var("S3_ENDPOINT");
        let path_style = parse_var("S3_PATH_STYLE", endpoint.is_some())?;
        Ok(Self {
            region: var_or("S3_REGION", "us-east-1"),
            endpoint,
            access_key: opt_var("S3_ACCESS_KEY"),
            secret_key: opt_var("S3_SECRET_KEY"),
            path_style,
        })
    }
}
