//! Configuration loading and types for dictkey
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/dictkey/config.toml)
//! 3. Environment variables (DICTKEY_*)
//! 4. CLI arguments (highest priority)

use crate::error::DictkeyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# dictkey configuration
#
# Location: ~/.config/dictkey/config.toml
# Reload a running daemon with: pkill -HUP dictkey

[hotkey]
# Hotkey that starts recording; press it again to stop.
# Format: modifiers and one key joined by '+', case-insensitive.
# Modifiers: ctrl, alt, altgr, shift, super (meta/win), hyper.
# Side-specific names like leftctrl or rightshift are accepted too.
# Examples: "ctrl+alt+r", "super+shift+d", "f13", "scrolllock"
start_recording = "ctrl+alt+r"

# Hotkey backend:
# - "auto": detect (desktop portal first, raw input devices on AppImage)
# - "dbus": always use the XDG desktop portal GlobalShortcuts interface
# - "evdev": always read /dev/input (requires the 'input' group)
# provider = "auto"

# Extra named actions. A running daemon logs each activation.
# [hotkey.actions]
# cancel = "ctrl+alt+c"
# paste_last = "ctrl+alt+v"
"#;

/// Which hotkey backend to use
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOverride {
    /// Detect from the runtime environment (default)
    #[default]
    Auto,
    /// XDG desktop portal over D-Bus
    Dbus,
    /// Raw input devices
    Evdev,
}

impl FromStr for ProviderOverride {
    type Err = DictkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(ProviderOverride::Auto),
            "dbus" | "portal" => Ok(ProviderOverride::Dbus),
            "evdev" => Ok(ProviderOverride::Evdev),
            other => Err(DictkeyError::Config(format!(
                "Unknown hotkey provider '{}' (expected auto, dbus or evdev)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderOverride::Auto => "auto",
            ProviderOverride::Dbus => "dbus",
            ProviderOverride::Evdev => "evdev",
        })
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,
}

/// Hotkey configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HotkeyConfig {
    /// Hotkey that toggles recording
    #[serde(default = "default_start_recording")]
    pub start_recording: String,

    /// Backend override
    #[serde(default)]
    pub provider: ProviderOverride,

    /// Named action → hotkey
    #[serde(default)]
    pub actions: HashMap<String, String>,
}

fn default_start_recording() -> String {
    "ctrl+alt+r".to_string()
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            start_recording: default_start_recording(),
            provider: ProviderOverride::Auto,
            actions: HashMap::new(),
        }
    }
}

impl HotkeyConfig {
    pub fn start_recording_hotkey(&self) -> String {
        self.start_recording.clone()
    }

    pub fn provider(&self) -> ProviderOverride {
        self.provider
    }

    /// Hotkey bound to a named action, or an empty string if unbound
    pub fn action_hotkey(&self, name: &str) -> String {
        self.actions.get(name).cloned().unwrap_or_default()
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dictkey")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the runtime directory for ephemeral files (PID file)
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir())
            .join("dictkey")
    }

    /// Apply `DICTKEY_*` overrides from an arbitrary variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), DictkeyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(hotkey) = lookup("DICTKEY_HOTKEY").filter(|v| !v.trim().is_empty()) {
            self.hotkey.start_recording = hotkey;
        }
        if let Some(provider) = lookup("DICTKEY_PROVIDER") {
            self.hotkey.provider = provider.parse()?;
        }
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, DictkeyError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| DictkeyError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| DictkeyError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    config.apply_env_overrides(|name| std::env::var(name).ok())?;

    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), DictkeyError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DictkeyError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| DictkeyError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| DictkeyError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Write the commented default config, refusing to overwrite
pub fn write_default_config(path: &Path) -> Result<(), DictkeyError> {
    if path.exists() {
        return Err(DictkeyError::Config(format!(
            "Config file already exists: {:?}",
            path
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey.start_recording_hotkey(), "ctrl+alt+r");
        assert_eq!(config.hotkey.provider(), ProviderOverride::Auto);
        assert_eq!(config.hotkey.action_hotkey("cancel"), "");
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            [hotkey]
            start_recording = "super+shift+d"
            provider = "evdev"

            [hotkey.actions]
            cancel = "ctrl+alt+c"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.start_recording, "super+shift+d");
        assert_eq!(config.hotkey.provider, ProviderOverride::Evdev);
        assert_eq!(config.hotkey.action_hotkey("cancel"), "ctrl+alt+c");
        assert_eq!(config.hotkey.action_hotkey("missing"), "");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.hotkey.start_recording, "ctrl+alt+r");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result: Result<Config, _> = toml::from_str("[hotkey]\nprovider = \"x11\"\n");
        assert!(result.is_err());
        assert!("x11".parse::<ProviderOverride>().is_err());
        assert_eq!("DBUS".parse::<ProviderOverride>().unwrap(), ProviderOverride::Dbus);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|name| match name {
                "DICTKEY_HOTKEY" => Some("f13".to_string()),
                "DICTKEY_PROVIDER" => Some("dbus".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.hotkey.start_recording, "f13");
        assert_eq!(config.hotkey.provider, ProviderOverride::Dbus);

        let mut config = Config::default();
        assert!(config
            .apply_env_overrides(|name| (name == "DICTKEY_PROVIDER").then(|| "bogus".to_string()))
            .is_err());
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.hotkey.provider = ProviderOverride::Evdev;
        config
            .hotkey
            .actions
            .insert("cancel".to_string(), "ctrl+alt+c".to_string());
        save_config(&config, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: Config = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[hotkey\nstart_recording = ").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(DictkeyError::Config(_))
        ));
    }

    #[test]
    fn test_write_default_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_default_config(&path).unwrap();
        assert!(write_default_config(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);
    }
}
