use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub download_dir: PathBuf,
    pub load_more_default: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".into(),
            request_timeout_secs: 30,
            download_dir: PathBuf::from("downloads"),
            load_more_default: 10,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server url '{}' must use http or https",
                self.server_url
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request timeout must be at least one second"));
        }
        if self.load_more_default == 0 {
            return Err(anyhow!("load_more_default must be a positive number"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    download_dir: Option<PathBuf>,
    load_more_default: Option<usize>,
}

/// Defaults, then `path` if it exists, then environment overrides.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw, path);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str, path: &Path) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable config file");
            return;
        }
    };

    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.download_dir {
        settings.download_dir = v;
    }
    if let Some(v) = file_cfg.load_more_default {
        settings.load_more_default = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DIAGNOSTICIAN_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(_) => warn!(value = %v, "APP__REQUEST_TIMEOUT_SECS is not a number"),
        }
    }

    if let Some(v) = var("APP__DOWNLOAD_DIR") {
        settings.download_dir = PathBuf::from(v);
    }

    if let Some(v) = var("APP__LOAD_MORE_DEFAULT") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.load_more_default = parsed,
            Err(_) => warn!(value = %v, "APP__LOAD_MORE_DEFAULT is not a number"),
        }
    }
}
