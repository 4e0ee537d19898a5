//! Daemon module - main event loop
//!
//! Runs the hotkey manager until SIGINT or SIGTERM. SIGHUP re-reads the
//! config file and rebinds hotkeys without restarting the process.

use crate::config::{self, Config, ProviderOverride};
use crate::error::{DictkeyError, Result};
use crate::hotkey::callback;
use crate::manager::HotkeyManager;
use std::path::{Path, PathBuf};
use tokio::signal::unix::{signal, SignalKind};

/// Write PID file so scripts can `kill -HUP` the daemon
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::runtime_dir().join("pid");

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

fn cleanup_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Long-running hotkey daemon
pub struct Daemon {
    config: Config,
    /// Explicit `--config` path; reloads read the same file
    config_path: Option<PathBuf>,
    /// Overrides from the command line, reapplied on reload
    hotkey_override: Option<String>,
    provider_override: Option<ProviderOverride>,
}

impl Daemon {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            hotkey_override: None,
            provider_override: None,
        }
    }

    /// Keep this hotkey across config reloads
    pub fn with_hotkey_override(mut self, hotkey: Option<String>) -> Self {
        self.hotkey_override = hotkey;
        self
    }

    /// Keep this provider across config reloads
    pub fn with_provider_override(mut self, provider: Option<ProviderOverride>) -> Self {
        self.provider_override = provider;
        self
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref hotkey) = self.hotkey_override {
            config.hotkey.start_recording = hotkey.clone();
        }
        if let Some(provider) = self.provider_override {
            config.hotkey.provider = provider;
        }
    }

    fn build_manager(&self) -> HotkeyManager {
        let mut manager = HotkeyManager::new(self.config.hotkey.clone());

        manager.register_callbacks(
            callback(|| {
                tracing::info!("Dictation on");
                Ok(())
            }),
            callback(|| {
                tracing::info!("Dictation off");
                Ok(())
            }),
        );

        let mut names: Vec<&String> = self.config.hotkey.actions.keys().collect();
        names.sort();
        for name in names {
            let action = name.clone();
            let registered = manager.register_hotkey_action(
                name,
                callback(move || {
                    tracing::info!("Action triggered: {}", action);
                    Ok(())
                }),
            );
            if let Err(e) = registered {
                tracing::warn!("Failed to register action '{}': {}", name, e);
            }
        }

        manager
    }

    fn reload(&mut self) -> Result<()> {
        let mut config = config::load_config(self.config_path.as_deref())?;
        self.apply_overrides(&mut config);
        self.config = config;
        Ok(())
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting dictkey daemon");

        let pid_file_path = write_pid_file();

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| DictkeyError::Config(format!("Failed to set up SIGTERM handler: {}", e)))?;
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| DictkeyError::Config(format!("Failed to set up SIGHUP handler: {}", e)))?;

        let mut manager = self.build_manager();

        // A failed start is not fatal: the user can fix permissions and SIGHUP
        if let Err(e) = manager.start().await {
            tracing::error!("Hotkeys unavailable: {}", e);
            tracing::info!("Fix the problem above, then reload with: pkill -HUP dictkey");
        }

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    let previous_actions = self.config.hotkey.actions.clone();
                    if let Err(e) = self.reload() {
                        tracing::warn!("Keeping previous configuration: {}", e);
                        continue;
                    }

                    let same_actions = previous_actions.len() == self.config.hotkey.actions.len()
                        && previous_actions
                            .keys()
                            .all(|name| self.config.hotkey.actions.contains_key(name));
                    let result = if same_actions {
                        manager.reload_config(self.config.hotkey.clone()).await
                    } else {
                        // The set of action callbacks changed; start from scratch
                        manager.stop().await;
                        manager = self.build_manager();
                        manager.start().await
                    };
                    if let Err(e) = result {
                        tracing::error!("Hotkeys unavailable after reload: {}", e);
                    }
                }

                // Handle graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                // Handle graceful shutdown (SIGTERM from systemctl stop)
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        manager.stop().await;

        if let Some(ref path) = pid_file_path {
            cleanup_pid_file(path);
        }

        tracing::info!("Daemon stopped");
        Ok(())
    }
}
