use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use plotter_core::compiler::DEFAULT_SETTLE_DELAY_MS;
use plotter_core::transport::DEFAULT_RECONNECT_BACKOFF;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "plotter.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub controller_host: String,
    pub reconnect_backoff: Duration,
    pub settle_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Address the controller uses in access-point mode.
            controller_host: "192.168.4.1".into(),
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    controller_host: Option<String>,
    reconnect_backoff_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
}

/// Defaults, then the TOML file (if present), then environment variables.
/// An explicitly requested file that is missing is an error; the default
/// file is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file_path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(file_path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", file_path.display()))?;
            apply_file_settings(&mut settings, file_cfg);
        }
        Err(err) if path.is_some() => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", file_path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.controller_host {
        settings.controller_host = v;
    }
    if let Some(v) = file_cfg.reconnect_backoff_ms {
        settings.reconnect_backoff = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.settle_delay_ms {
        settings.settle_delay_ms = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    if let Some(v) = var("PLOTTER_CONTROLLER") {
        settings.controller_host = v;
    }
    if let Some(v) = var("APP__CONTROLLER_HOST") {
        settings.controller_host = v;
    }

    if let Some(v) = var("PLOTTER_RECONNECT_BACKOFF_MS") {
        let ms = v
            .parse::<u64>()
            .with_context(|| format!("PLOTTER_RECONNECT_BACKOFF_MS must be a number, got {v:?}"))?;
        settings.reconnect_backoff = Duration::from_millis(ms);
    }

    if let Some(v) = var("PLOTTER_SETTLE_DELAY_MS") {
        settings.settle_delay_ms = v
            .parse::<u64>()
            .with_context(|| format!("PLOTTER_SETTLE_DELAY_MS must be a number, got {v:?}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn reads_explicit_config_file() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("plotter_config_test_{suffix}.toml"));
        fs::write(
            &path,
            "controller_host = \"10.0.0.7\"\nreconnect_backoff_ms = 250\nsettle_delay_ms = 0\n",
        )
        .expect("write config");

        let settings = load_settings(Some(&path)).expect("load");
        fs::remove_file(&path).expect("cleanup");

        // Environment may still override the host on a developer machine.
        if env::var("PLOTTER_CONTROLLER").is_err() && env::var("APP__CONTROLLER_HOST").is_err() {
            assert_eq!(settings.controller_host, "10.0.0.7");
        }
        if env::var("PLOTTER_RECONNECT_BACKOFF_MS").is_err() {
            assert_eq!(settings.reconnect_backoff, Duration::from_millis(250));
        }
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = env::temp_dir().join("plotter_config_that_does_not_exist.toml");
        assert!(load_settings(Some(&path)).is_err());
    }

    #[test]
    fn env_overrides_and_rejects_bad_numbers() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PLOTTER_CONTROLLER", "a.local"),
            ("APP__CONTROLLER_HOST", "b.local"),
            ("PLOTTER_SETTLE_DELAY_MS", "500"),
        ]);
        let mut settings = Settings::default();
        apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string())).expect("env");
        assert_eq!(settings.controller_host, "b.local");
        assert_eq!(settings.settle_delay_ms, 500);

        let bad: HashMap<&str, &str> = HashMap::from([("PLOTTER_RECONNECT_BACKOFF_MS", "soon")]);
        assert!(apply_env(&mut settings, |key| bad.get(key).map(|v| v.to_string())).is_err());
    }
}
