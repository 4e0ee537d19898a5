//! Provider selection and fallback policy
//!
//! Pure functions of (override, runtime, probe results). The manager does
//! the probing; these decide.
//!
//! Priority without an override:
//! - Flatpak: portal only (raw devices are sandboxed away)
//! - AppImage: evdev, then portal
//! - system: portal, then evdev
//!
//! and the null provider if nothing is supported.

use super::ProviderKind;
use crate::config::ProviderOverride;
use crate::environment::{Environment, RuntimeKind};

/// Probe results for the real providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Supported {
    pub portal: bool,
    pub evdev: bool,
}

impl Supported {
    pub fn contains(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Portal => self.portal,
            ProviderKind::Evdev => self.evdev,
            ProviderKind::Null => true,
        }
    }

    pub fn set(&mut self, kind: ProviderKind, supported: bool) {
        match kind {
            ProviderKind::Portal => self.portal = supported,
            ProviderKind::Evdev => self.evdev = supported,
            ProviderKind::Null => {}
        }
    }
}

/// Real providers worth probing for a runtime, in priority order
pub fn candidate_order(runtime: RuntimeKind) -> &'static [ProviderKind] {
    match runtime {
        RuntimeKind::Flatpak => &[ProviderKind::Portal],
        RuntimeKind::AppImage => &[ProviderKind::Evdev, ProviderKind::Portal],
        RuntimeKind::System => &[ProviderKind::Portal, ProviderKind::Evdev],
    }
}

/// Pick the provider to use
///
/// An explicit override bypasses detection and probing entirely.
pub fn select_provider(
    provider_override: ProviderOverride,
    runtime: RuntimeKind,
    supported: Supported,
) -> ProviderKind {
    match provider_override {
        ProviderOverride::Dbus => return ProviderKind::Portal,
        ProviderOverride::Evdev => return ProviderKind::Evdev,
        ProviderOverride::Auto => {}
    }

    candidate_order(runtime)
        .iter()
        .copied()
        .find(|kind| supported.contains(*kind))
        .unwrap_or(ProviderKind::Null)
}

/// The provider to retry with after `primary` failed to start, if any
///
/// On GNOME and KDE (outside AppImage) a portal failure is a permissions
/// problem to fix, not a reason to silently demand raw device access.
/// Flatpak cannot read raw devices at all.
pub fn fallback_for(primary: ProviderKind, env: &Environment) -> Option<ProviderKind> {
    let other = match primary {
        ProviderKind::Portal => ProviderKind::Evdev,
        ProviderKind::Evdev => ProviderKind::Portal,
        ProviderKind::Null => return None,
    };

    if (env.is_gnome() || env.is_kde()) && !env.runtime.is_appimage() {
        return None;
    }
    if env.runtime.is_flatpak() && other == ProviderKind::Evdev {
        return None;
    }
    Some(other)
}
