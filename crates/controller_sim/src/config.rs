use std::{fs, net::SocketAddr, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_CONFIG_FILE: &str = "controller_sim.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub ack_delay: Duration,
    /// Address reported in `IP:` replies. Defaults to the bind address.
    pub reported_ip: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            ack_delay: Duration::from_millis(20),
            reported_ip: None,
        }
    }
}

impl Settings {
    pub fn reported_ip(&self) -> String {
        self.reported_ip
            .clone()
            .unwrap_or_else(|| self.bind_addr.clone())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.bind_addr))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    ack_delay_ms: Option<u64>,
    reported_ip: Option<String>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Some(file_cfg) = read_file_settings(Path::new(DEFAULT_CONFIG_FILE)) {
        apply_file_settings(&mut settings, file_cfg);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn read_file_settings(path: &Path) -> Option<FileSettings> {
    let raw = fs::read_to_string(path).ok()?;
    match toml::from_str::<FileSettings>(&raw) {
        Ok(file_cfg) => Some(file_cfg),
        Err(err) => {
            warn!(path = %path.display(), %err, "ignoring unreadable config file");
            None
        }
    }
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.bind_addr = v;
    }
    if let Some(v) = file_cfg.ack_delay_ms {
        settings.ack_delay = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.reported_ip {
        settings.reported_ip = Some(v);
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SIM_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Some(v) = var("SIM_ACK_DELAY_MS") {
        match v.parse::<u64>() {
            Ok(ms) => settings.ack_delay = Duration::from_millis(ms),
            Err(_) => warn!(value = %v, "SIM_ACK_DELAY_MS is not a number"),
        }
    }

    if let Some(v) = var("SIM_REPORTED_IP") {
        settings.reported_ip = Some(v);
    }
}
