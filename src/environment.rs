//! Runtime environment detection
//!
//! Classifies the process as running on the plain system, from an AppImage,
//! or inside a Flatpak sandbox, and records the desktop environment. Both
//! feed provider selection and fallback.

use serde::Serialize;
use std::fmt;

/// How the application is packaged at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    System,
    AppImage,
    Flatpak,
}

impl RuntimeKind {
    pub fn is_flatpak(&self) -> bool {
        matches!(self, RuntimeKind::Flatpak)
    }

    pub fn is_appimage(&self) -> bool {
        matches!(self, RuntimeKind::AppImage)
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeKind::System => "system",
            RuntimeKind::AppImage => "appimage",
            RuntimeKind::Flatpak => "flatpak",
        })
    }
}

/// Snapshot of the environment variables that matter for hotkeys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub runtime: RuntimeKind,
    /// Raw `XDG_CURRENT_DESKTOP` (colon-separated list), empty if unset
    pub desktop: String,
}

impl Environment {
    /// Inspect the current process environment
    pub fn detect() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |name: &str| lookup(name).is_some_and(|v| !v.is_empty());

        // Flatpak wins: an AppImage extracted inside a sandbox is still sandboxed
        let runtime = if set("FLATPAK_ID") {
            RuntimeKind::Flatpak
        } else if set("APPIMAGE") || set("APPDIR") {
            RuntimeKind::AppImage
        } else {
            RuntimeKind::System
        };

        Self {
            runtime,
            desktop: lookup("XDG_CURRENT_DESKTOP").unwrap_or_default(),
        }
    }

    fn desktop_is(&self, name: &str) -> bool {
        self.desktop
            .split(':')
            .any(|d| d.trim().eq_ignore_ascii_case(name))
    }

    pub fn is_gnome(&self) -> bool {
        self.desktop_is("gnome")
    }

    pub fn is_kde(&self) -> bool {
        self.desktop_is("kde")
    }
}
