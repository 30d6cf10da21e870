use std::path::{Path, PathBuf};

/// Application directory (~/.branchchat)
pub fn app_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".branchchat")
}

/// ~/.branchchat/config.json
pub fn config_json_path() -> PathBuf {
    app_dir().join("config.json")
}

/// Default location of persisted conversations
pub fn default_data_dir() -> PathBuf {
    app_dir().join("conversations")
}

/// Loads a JSON config file.
pub fn load_config_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read config: {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {e}"))
}
