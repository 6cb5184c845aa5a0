use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use pfc_core::db::PoolSettings;

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve the database location. An explicit path wins over the
    /// platform data directory.
    pub fn load(database: Option<PathBuf>) -> Result<Self> {
        if let Some(db_path) = database {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
            return Ok(Config { db_path });
        }

        let proj_dirs =
            ProjectDirs::from("", "", "pfc").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("pfc.db"),
        })
    }
}

/// Knobs for the HTTP server.
#[derive(Debug, Clone, Copy)]
pub struct ServeConfig {
    pub request_timeout: Duration,
    pub pool: PoolSettings,
}

impl ServeConfig {
    pub fn new(request_timeout_secs: u64, pool_size: u32) -> Self {
        let request_timeout = Duration::from_secs(request_timeout_secs.max(1));
        // Waiting on the pool must not outlive the request itself.
        let connection_timeout = request_timeout.mul_f64(0.5);
        Self {
            request_timeout,
            pool: PoolSettings {
                max_size: pool_size.max(1),
                connection_timeout,
            },
        }
    }
}
