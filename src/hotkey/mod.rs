//! Hotkey provider subsystem
//!
//! Three interchangeable providers satisfy one contract:
//!
//! - **portal**: the XDG desktop portal `GlobalShortcuts` D-Bus interface.
//!   Works under Flatpak and on GNOME/KDE Wayland without extra permissions.
//! - **evdev**: kernel-level key events read from `/dev/input/event*`.
//!   Works on every compositor but requires membership in the 'input' group.
//! - **null**: always available, never fires. Selected when nothing else is,
//!   and prints what to fix.
//!
//! Which one runs is decided by [`selector`] from the environment and the
//! configured override; the [`crate::manager::HotkeyManager`] owns it.

pub mod capture;
pub mod devices;
pub mod evdev_listener;
pub mod keys;
pub mod null;
#[cfg(target_os = "linux")]
pub mod portal;
pub mod selector;

use crate::error::HotkeyError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback fired when a registered hotkey is activated
///
/// Callbacks run outside any provider lock, on the blocking pool, so they
/// may take their time or call back into the manager.
pub type HotkeyCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`HotkeyCallback`]
pub fn callback<F>(f: F) -> HotkeyCallback
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Run a callback on the blocking pool, logging its failure
pub(crate) fn dispatch(hotkey: &str, callback: HotkeyCallback) {
    let hotkey = hotkey.to_string();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = callback() {
            let error = HotkeyError::Callback(format!("{}: {:#}", hotkey, e));
            tracing::warn!("{}", error);
        }
    });
}

/// Trait for hotkey provider implementations
#[async_trait::async_trait]
pub trait HotkeyProvider: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Cheap, side-effect-free probe: can this provider work here?
    async fn is_supported(&self) -> bool;

    /// Begin delivering hotkey activations to registered callbacks
    async fn start(&mut self) -> Result<(), HotkeyError>;

    /// Stop listening and release backend resources
    ///
    /// Idempotent, and bounded in time even if the backend is unresponsive.
    async fn stop(&mut self);

    /// Register a callback for a hotkey string; callable before `start()`
    fn register_hotkey(&mut self, hotkey: &str, callback: HotkeyCallback)
        -> Result<(), HotkeyError>;

    /// Listen for exactly one key combination and return it
    async fn capture_once(&self, timeout: Duration) -> Result<String, HotkeyError>;

    /// Whether `capture_once` is implemented by this provider
    fn supports_capture_once(&self) -> bool;

    /// Whether the provider is currently listening
    fn is_listening(&self) -> bool;
}

/// The provider implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Portal,
    Evdev,
    Null,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Portal => "dbus",
            ProviderKind::Evdev => "evdev",
            ProviderKind::Null => "null",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creates provider instances
///
/// The manager creates providers through this trait so that selection and
/// fallback never depend on concrete provider types.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, kind: ProviderKind) -> Box<dyn HotkeyProvider>;
}

/// Factory for the real providers
#[derive(Debug, Default, Clone)]
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    #[cfg(target_os = "linux")]
    fn create(&self, kind: ProviderKind) -> Box<dyn HotkeyProvider> {
        match kind {
            ProviderKind::Portal => Box::new(portal::PortalProvider::new()),
            ProviderKind::Evdev => Box::new(evdev_listener::EvdevProvider::new(Arc::new(
                devices::EvdevSource::new(),
            ))),
            ProviderKind::Null => Box::new(null::NullProvider::new()),
        }
    }

    /// Neither backend exists off Linux
    #[cfg(not(target_os = "linux"))]
    fn create(&self, _kind: ProviderKind) -> Box<dyn HotkeyProvider> {
        Box::new(null::NullProvider::new())
    }
}
