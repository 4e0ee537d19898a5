//! Provider of last resort
//!
//! Accepts every registration and never fires. Selected when neither the
//! desktop portal nor evdev is usable; on start it explains how to enable
//! one of them.

use super::{HotkeyCallback, HotkeyProvider};
use crate::environment::Environment;
use crate::error::HotkeyError;
use std::collections::HashSet;
use std::time::Duration;

/// No-op hotkey provider
#[derive(Default)]
pub struct NullProvider {
    hotkeys: HashSet<String>,
    listening: bool,
}

impl NullProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl HotkeyProvider for NullProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn is_supported(&self) -> bool {
        true
    }

    async fn start(&mut self) -> Result<(), HotkeyError> {
        if self.listening {
            return Err(HotkeyError::AlreadyStarted);
        }
        self.listening = true;

        tracing::warn!(
            "No global hotkey backend available; {} hotkey(s) will not fire",
            self.hotkeys.len()
        );
        for line in remediation_steps(&Environment::detect()) {
            tracing::warn!("  {}", line);
        }
        Ok(())
    }

    async fn stop(&mut self) {
        self.listening = false;
    }

    fn register_hotkey(
        &mut self,
        hotkey: &str,
        _callback: HotkeyCallback,
    ) -> Result<(), HotkeyError> {
        tracing::debug!("Accepted hotkey '{}' (null provider, will not fire)", hotkey);
        self.hotkeys.insert(hotkey.to_string());
        Ok(())
    }

    async fn capture_once(&self, _timeout: Duration) -> Result<String, HotkeyError> {
        Err(HotkeyError::CaptureNotSupported("null"))
    }

    fn supports_capture_once(&self) -> bool {
        false
    }

    fn is_listening(&self) -> bool {
        self.listening
    }
}

/// What the user can do to get a working hotkey backend
pub fn remediation_steps(env: &Environment) -> Vec<String> {
    let mut steps = Vec::new();

    if env.runtime.is_flatpak() {
        steps.push(
            "Running in Flatpak: only the desktop portal is available. Make sure \
             xdg-desktop-portal and your desktop's portal backend are installed and running."
                .to_string(),
        );
    } else {
        steps.push(
            "For the evdev backend, add yourself to the input group: \
             sudo usermod -aG input $USER (then log out and back in)"
                .to_string(),
        );
        if !in_input_group() {
            steps.push("You are currently NOT in the 'input' group".to_string());
        }
    }

    if env.is_gnome() {
        steps.push(
            "GNOME: global shortcuts need GNOME 48+ with xdg-desktop-portal-gnome. Check: \
             busctl --user introspect org.freedesktop.portal.Desktop /org/freedesktop/portal/desktop"
                .to_string(),
        );
    } else if env.is_kde() {
        steps.push(
            "KDE: make sure xdg-desktop-portal-kde is installed. Check: \
             busctl --user introspect org.freedesktop.portal.Desktop /org/freedesktop/portal/desktop"
                .to_string(),
        );
    } else {
        steps.push(
            "Check that your compositor's portal implements GlobalShortcuts \
             (e.g. xdg-desktop-portal-hyprland), or bind a compositor key to your app's control command"
                .to_string(),
        );
    }

    steps.push(
        "Force a backend with provider = \"dbus\" or provider = \"evdev\" under [hotkey] in the config"
            .to_string(),
    );
    steps
}

/// Whether the current process has the 'input' group among its groups
#[cfg(target_os = "linux")]
fn in_input_group() -> bool {
    let Ok(Some(input)) = nix::unistd::Group::from_name("input") else {
        return false;
    };
    nix::unistd::getgroups()
        .map(|groups| groups.contains(&input.gid))
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn in_input_group() -> bool {
    false
}
