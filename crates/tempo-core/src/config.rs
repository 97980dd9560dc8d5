use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Deserialize;
use tracing::{debug, info, warn};

const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV_VAR: &str = "TEMPO_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: Option<PathBuf>,
    pub default_command: String,
    pub color: bool,
    pub notify: bool,
    pub confirm_delete: bool,
    pub timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: None,
            default_command: "list".to_string(),
            color: true,
            notify: true,
            confirm_delete: true,
            timezone: None,
        }
    }
}

impl Config {
    #[tracing::instrument(skip(override_path))]
    pub fn load(override_path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = resolve_config_path(override_path) else {
            warn!("no config file found; using defaults");
            return Ok(Self::default());
        };

        // An explicitly named config that cannot be read is a bootstrap
        // error; the discovered default silently falls back.
        let explicit = override_path.is_some() || std::env::var(CONFIG_ENV_VAR).is_ok();
        if !path.exists() {
            if explicit {
                return Err(anyhow!("config file not found: {}", path.display()));
            }
            debug!(path = %path.display(), "config file absent; using defaults");
            return Ok(Self::default());
        }

        info!(config = %path.display(), "loading config");
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    // --set key=value overrides, applied after the file. Unknown keys and
    // unparsable values warn and are ignored.
    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in overrides {
            debug!(key = %key, value = %value, "applying override");
            match key.as_str() {
                "data" => self.data = Some(PathBuf::from(&value)),
                "default_command" => self.default_command = value,
                "color" => self.color = parse_bool(&value),
                "notify" => self.notify = parse_bool(&value),
                "confirm_delete" => self.confirm_delete = parse_bool(&value),
                "timezone" => self.timezone = Some(value),
                other => warn!(key = %other, "unknown config key ignored"),
            }
        }
    }
}

fn resolve_config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|dir| dir.join("tempo").join(CONFIG_FILE))
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(configured) = &cfg.data {
        expand_tilde(configured)
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    if let Some(data) = dirs::data_dir() {
        return Ok(data.join("tempo"));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".tempo"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = Config::default();
        cfg.apply_overrides([
            ("color".to_string(), "off".to_string()),
            ("default_command".to_string(), "stats".to_string()),
            ("bogus".to_string(), "ignored".to_string()),
        ]);

        assert!(!cfg.color);
        assert_eq!(cfg.default_command, "stats");
        assert!(cfg.notify);
    }

    #[test]
    fn defaults_are_usable() {
        let cfg = Config::default();
        assert_eq!(cfg.default_command, "list");
        assert!(cfg.confirm_delete);
    }
}
