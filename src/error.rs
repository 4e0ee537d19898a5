//! Error types for dictkey
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the dictkey application
#[derive(Error, Debug)]
pub enum DictkeyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey providers
#[derive(Error, Debug)]
pub enum HotkeyError {
    /// The probe for this backend failed; the caller should try the next candidate
    #[error("Hotkey provider '{0}' is not supported in this environment")]
    Unsupported(&'static str),

    #[error("Hotkey provider already started")]
    AlreadyStarted,

    #[error("Hotkey '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Bus unreachable, session creation failed, bind rejected
    #[error("Desktop portal error: {0}")]
    Protocol(String),

    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("evdev error: {0}")]
    Evdev(String),

    /// No key was pressed before the deadline; the caller may simply retry
    #[error("No key combination captured within {0:?}")]
    CaptureTimeout(Duration),

    /// The user pressed bare Escape
    #[error("Key capture cancelled")]
    CaptureCancelled,

    #[error("Key capture is not supported by the '{0}' provider")]
    CaptureNotSupported(&'static str),

    #[error("'{0}' is not usable as a global hotkey. Add a modifier such as ctrl or alt.")]
    InvalidCapture(String),

    #[error("Hotkey callback failed: {0}")]
    Callback(String),
}

impl HotkeyError {
    /// Whether this error means "the user declined" rather than "try again"
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HotkeyError::CaptureCancelled)
    }

    /// Whether this error is a capture deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, HotkeyError::CaptureTimeout(_))
    }
}

/// Result type alias using DictkeyError
pub type Result<T> = std::result::Result<T, DictkeyError>;

#[cfg(target_os = "linux")]
impl From<zbus::Error> for HotkeyError {
    fn from(e: zbus::Error) -> Self {
        HotkeyError::Protocol(e.to_string())
    }
}
