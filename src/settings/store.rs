use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::rodio::PlatformConfig;
use crate::player::BackendOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Backend id probed first (`session` / `graph`); `None` keeps the static order
    pub backend: Option<String>,

    // playback
    pub volume: f32,
    pub gain_db: f32,

    // session teardown / end detection
    pub close_timeout_ms: u64,
    pub finish_tolerance_ms: u64,

    // network
    pub http_timeout_secs: u64,
    pub http_connect_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backend: None,
            volume: 1.0,
            gain_db: 0.0,
            close_timeout_ms: 5000,
            finish_tolerance_ms: 200,
            http_timeout_secs: 30,
            http_connect_timeout_secs: 10,
        }
    }
}

impl EngineSettings {
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            finish_tolerance: Duration::from_millis(self.finish_tolerance_ms),
        }
    }

    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            http_connect_timeout: Duration::from_secs(self.http_connect_timeout_secs),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("dev", "barplayer", "barplayer")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("barplayer"))
}

pub fn load_settings(data_dir: &Path) -> EngineSettings {
    let p = settings_path(data_dir);
    let Ok(bytes) = fs::read(&p) else {
        return EngineSettings::default();
    };
    match serde_json::from_slice(&bytes) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %p.display(), err = %e, "settings unreadable, using defaults");
            EngineSettings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, s: &EngineSettings) -> std::io::Result<()> {
    fs::create_dir_all(data_dir)?;
    let p = settings_path(data_dir);
    let tmp = p.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(s)?;
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, &p) {
        let _ = fs::remove_file(&p);
        fs::rename(&tmp, &p).map_err(|_| e)?;
    }
    Ok(())
}

fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}
