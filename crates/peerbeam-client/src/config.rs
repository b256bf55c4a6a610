use std::path::PathBuf;

use anyhow::{Context, Result};

use peerbeam_transfer::{DEFAULT_MAX_FILE_SIZE, DEFAULT_SEND_WINDOW};

/// Client settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
    pub max_file_size: u64,
    pub send_window: usize,
    /// Received files are written here when set, kept in memory otherwise.
    pub download_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:3030/ws".into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            send_window: DEFAULT_SEND_WINDOW,
            download_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let relay_url = lookup("PEERBEAM_RELAY_URL").unwrap_or(defaults.relay_url);
        anyhow::ensure!(
            relay_url.starts_with("ws://") || relay_url.starts_with("wss://"),
            "PEERBEAM_RELAY_URL={relay_url:?} is not a ws:// or wss:// URL"
        );

        let max_file_size = match lookup("PEERBEAM_MAX_FILE_SIZE") {
            Some(v) => v
                .parse()
                .with_context(|| format!("PEERBEAM_MAX_FILE_SIZE={v:?} is not a byte count"))?,
            None => defaults.max_file_size,
        };

        let send_window = match lookup("PEERBEAM_SEND_WINDOW") {
            Some(v) => {
                let window: usize = v
                    .parse()
                    .with_context(|| format!("PEERBEAM_SEND_WINDOW={v:?} is not a number"))?;
                anyhow::ensure!(window > 0, "PEERBEAM_SEND_WINDOW must be at least 1");
                window
            }
            None => defaults.send_window,
        };

        let download_dir = lookup("PEERBEAM_DOWNLOAD_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            relay_url,
            max_file_size,
            send_window,
            download_dir,
        })
    }
}
