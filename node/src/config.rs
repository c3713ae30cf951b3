use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sidewinder_messaging::DEFAULT_PORT;

/// Runtime configuration for a sidewinder endpoint.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the on-disk state; keys and contacts live beneath it.
    pub data_dir: PathBuf,
    pub listen_port: u16,
    pub connect_timeout: Duration,
    /// Inactivity bound on established sessions.
    pub read_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = env::var("SIDEWINDER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let listen_port = env::var("SIDEWINDER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Ok(Self {
            data_dir,
            listen_port,
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
        })
    }

    pub fn key_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }

    pub fn contact_dir(&self) -> PathBuf {
        self.data_dir.join("contacts")
    }
}
