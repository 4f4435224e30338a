//! Worker configuration loaded from environment variables.

use std::time::Duration;

use mediaq_pipeline::config::{parse_var, ConfigError, EngineConfig, S3Config, ToolConfig};

use crate::pool::PoolConfig;

/// Everything the worker binary needs to start.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// Apply embedded migrations on startup.
    pub run_migrations: bool,
    /// Prefix of the names this process claims jobs under.
    pub worker_name: String,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub cancel_poll_interval: Duration,
    /// Heartbeat age after which a running job is handed back to the queue.
    pub stale_lease: Duration,
    pub reap_interval: Duration,
    pub engine: EngineConfig,
    pub tools: ToolConfig,
    pub s3: S3Config,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default          |
    /// |---------------------------|------------------|
    /// | `DATABASE_URL`            | required         |
    /// | `DB_MAX_CONNECTIONS`      | `20`             |
    /// | `RUN_MIGRATIONS`          | `true`           |
    /// | `WORKER_NAME`             | `mediaq-worker`  |
    /// | `WORKER_CONCURRENCY`      | `4`              |
    /// | `POLL_INTERVAL_MS`        | `1000`           |
    /// | `CANCEL_POLL_INTERVAL_MS` | `500`            |
    /// | `STALE_JOB_LEASE_SECS`    | `300`            |
    /// | `REAP_INTERVAL_SECS`      | `60`             |
    ///
    /// Engine, tool and S3 settings are read by their own `from_env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let concurrency: usize = parse_var("WORKER_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                value: "0".into(),
            });
        }

        Ok(Self {
            database_url,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            run_migrations: parse_var("RUN_MIGRATIONS", true)?,
            worker_name: parse_var("WORKER_NAME", "mediaq-worker".to_string())?,
            concurrency,
            poll_interval: Duration::from_millis(parse_var("POLL_INTERVAL_MS", 1000)?),
            cancel_poll_interval: Duration::from_millis(parse_var("CANCEL_POLL_INTERVAL_MS", 500)?),
            stale_lease: Duration::from_secs(parse_var("STALE_JOB_LEASE_SECS", 300)?),
            reap_interval: Duration::from_secs(parse_var("REAP_INTERVAL_SECS", 60)?),
            engine: EngineConfig::from_env()?,
            tools: ToolConfig::from_env(),
            s3: S3Config::from_env()?,
        })
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            name: self.worker_name.clone(),
            concurrency: self.concurrency,
            poll_interval: self.poll_interval,
            cancel_poll_interval: self.cancel_poll_interval,
            stale_lease: self.stale_lease,
            reap_interval: self.reap_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_carries_worker_settings() {
        let config = WorkerConfig {
            database_url: "postgres://localhost/mediaq".into(),
            db_max_connections: 5,
            run_migrations: false,
            worker_name: "gpu-box".into(),
            concurrency: 2,
            poll_interval: Duration::from_millis(250),
            cancel_poll_interval: Duration::from_millis(100),
            stale_lease: Duration::from_secs(120),
            reap_interval: Duration::from_secs(30),
            engine: EngineConfig {
                bucket: "media".into(),
                temp_dir: std::env::temp_dir(),
            },
            tools: ToolConfig {
                ffmpeg_path: "ffmpeg".into(),
                ffprobe_path: "ffprobe".into(),
                detector_path: "mediaq-detect".into(),
            },
            s3: S3Config {
                region: "us-east-1".into(),
                endpoint: None,
                access_key: None,
                secret_key: None,
                path_style: false,
            },
        };

        let pool = config.pool_config();
        assert_eq!(pool.name, "gpu-box");
        assert_eq!(pool.concurrency, 2);
        assert_eq!(pool.poll_interval, Duration::from_millis(250));
        assert_eq!(pool.cancel_poll_interval, Duration::from_millis(100));
        assert_eq!(pool.stale_lease, Duration::from_secs(120));
        assert_eq!(pool.reap_interval, Duration::from_secs(30));
    }
}
