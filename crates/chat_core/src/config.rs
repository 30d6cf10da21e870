use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths;

/// Upper bound on provider round trips for one request.
pub const MAX_ITERATIONS: u32 = 200;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL: &str = "echo";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub model: String,
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
    pub port: u16,
    pub debug: bool,
}

const CONFIG_FILE_PATH: &str = "config.toml";

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            model: DEFAULT_MODEL.to_string(),
            max_iterations: MAX_ITERATIONS,
            system_prompt: None,
            port: DEFAULT_PORT,
            debug: false,
        }
    }
}

impl Config {
    /// Loads `~/.branchchat/config.json`, falling back to `./config.toml`,
    /// then applies environment overrides.
    pub fn new() -> Self {
        let config = paths::load_config_json::<Config>(&paths::config_json_path())
            .ok()
            .or_else(|| Self::from_toml_file(Path::new(CONFIG_FILE_PATH)))
            .unwrap_or_default();
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn from_toml_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<Config>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Ignoring {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Applies `BRANCHCHAT_*` style overrides read through `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("BRANCHCHAT_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(model) = lookup("MODEL") {
            self.model = model;
        }
        if let Some(value) = lookup("MAX_ITERATIONS") {
            match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => self.max_iterations = n,
                _ => log::warn!("Ignoring invalid MAX_ITERATIONS={value:?}"),
            }
        }
        if let Some(prompt) = lookup("SYSTEM_PROMPT") {
            self.system_prompt = Some(prompt);
        }
        if let Some(value) = lookup("PORT") {
            match value.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => log::warn!("Ignoring invalid PORT={value:?}"),
            }
        }
        if let Some(value) = lookup("BRANCHCHAT_DEBUG") {
            self.debug = parse_bool_env(&value);
        }
        self
    }

    /// Resolved storage directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(paths::default_data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_bool_env_true_values() {
        for value in ["1", "true", "TRUE", " yes ", "Y", "on"] {
            assert!(parse_bool_env(value), "value {value:?} should be true");
        }
    }

    #[test]
    fn parse_bool_env_false_values() {
        for value in ["0", "false", "no", "off", "", "  "] {
            assert!(!parse_bool_env(value), "value {value:?} should be false");
        }
    }

    #[test]
    fn env_overrides_file_values() {
        let config = Config::default().with_env_overrides(env(&[
            ("MODEL", "scripted"),
            ("MAX_ITERATIONS", "12"),
            ("PORT", "9000"),
            ("BRANCHCHAT_DATA_DIR", "/tmp/chats"),
        ]));

        assert_eq!(config.model, "scripted");
        assert_eq!(config.max_iterations, 12);
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/chats"));
    }

    #[test]
    fn invalid_numbers_keep_defaults() {
        let config = Config::default()
            .with_env_overrides(env(&[("MAX_ITERATIONS", "0"), ("PORT", "http")]));
        assert_eq!(config.max_iterations, MAX_ITERATIONS);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn toml_fields_are_optional() {
        let config: Config = toml::from_str("model = \"gpt\"\n").unwrap();
        assert_eq!(config.model, "gpt");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.system_prompt.is_none());
    }
}
