use std::{net::SocketAddr, path::Path};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:3000/api";
const DEFAULT_FETCH_PERIOD_SECS: u64 = 300;
const DEFAULT_RETRY_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: std::path::PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the commerce backend's REST API.
    pub url: String,
    /// Optional bearer token for the backend.
    pub token: Option<String>,
    /// Seconds between full snapshot fetches.
    pub fetch_period_secs: u64,
    /// Seconds between retries after a failed fetch pass.
    pub retry_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub backend: BackendSettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("backend.url", DEFAULT_BACKEND_URL)?
            .set_default("backend.fetch_period_secs", DEFAULT_FETCH_PERIOD_SECS)?
            .set_default("backend.retry_secs", DEFAULT_RETRY_SECS)?;

        let cfg = builder.add_source(File::from(path)).build()?;

        cfg.try_deserialize()
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
