//! Hotkey manager
//!
//! Owns the active provider. Selects it from the environment and config,
//! registers the recording toggle and named actions, starts it, and falls
//! back to the other backend when the first one cannot start.

use crate::config::{HotkeyConfig, ProviderOverride};
use crate::environment::Environment;
use crate::error::HotkeyError;
use crate::hotkey::selector::{self, Supported};
use crate::hotkey::{
    callback, DefaultProviderFactory, HotkeyCallback, HotkeyProvider, ProviderFactory,
    ProviderKind,
};
use crate::state::ManagerState;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Default)]
struct RecordingCallbacks {
    on_start: Option<HotkeyCallback>,
    on_stop: Option<HotkeyCallback>,
}

/// Selects, configures and runs a hotkey provider
pub struct HotkeyManager {
    config: HotkeyConfig,
    env: Environment,
    factory: Box<dyn ProviderFactory>,
    provider: Option<Box<dyn HotkeyProvider>>,
    state: ManagerState,
    recording: Arc<AtomicBool>,
    callbacks: Arc<RwLock<RecordingCallbacks>>,
    /// Ordered so registration order is stable across restarts
    actions: BTreeMap<String, HotkeyCallback>,
}

impl HotkeyManager {
    /// Manager for the real providers in the detected environment
    pub fn new(config: HotkeyConfig) -> Self {
        Self::with_factory(config, Environment::detect(), Box::new(DefaultProviderFactory))
    }

    pub fn with_factory(
        config: HotkeyConfig,
        env: Environment,
        factory: Box<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config,
            env,
            factory,
            provider: None,
            state: ManagerState::new(),
            recording: Arc::new(AtomicBool::new(false)),
            callbacks: Arc::new(RwLock::new(RecordingCallbacks::default())),
            actions: BTreeMap::new(),
        }
    }

    /// Set what happens when the start/stop hotkey toggles recording
    pub fn register_callbacks(&mut self, on_start: HotkeyCallback, on_stop: HotkeyCallback) {
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.on_start = Some(on_start);
            callbacks.on_stop = Some(on_stop);
        }
    }

    /// Bind a named action from `[hotkey.actions]` to a callback
    ///
    /// An action without a configured hotkey is remembered but not bound.
    /// When a provider is already active the hotkey is registered with it
    /// right away.
    pub fn register_hotkey_action(
        &mut self,
        name: &str,
        action: HotkeyCallback,
    ) -> Result<(), HotkeyError> {
        if self.actions.contains_key(name) {
            return Err(HotkeyError::AlreadyRegistered(name.to_string()));
        }

        if let Some(provider) = self.provider.as_mut() {
            let hotkey = self.config.action_hotkey(name);
            if !hotkey.is_empty() {
                provider.register_hotkey(&hotkey, action.clone())?;
            }
        }

        self.actions.insert(name.to_string(), action);
        Ok(())
    }

    /// Select a provider and start listening
    ///
    /// If the selected provider fails to start and a fallback is allowed
    /// for this environment, the other backend is tried before giving up.
    pub async fn start(&mut self) -> Result<(), HotkeyError> {
        if self.provider.is_some() {
            return Err(HotkeyError::AlreadyStarted);
        }

        let primary = self.select().await;
        let error = match self.start_provider(primary).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!("{} hotkey provider failed to start: {}", primary, error);

        let fallback = if self.config.provider() == ProviderOverride::Auto {
            selector::fallback_for(primary, &self.env)
        } else {
            None
        };
        let Some(fallback) = fallback else {
            return Err(self.fail(error));
        };

        if !self.factory.create(fallback).is_supported().await {
            tracing::debug!("Not falling back: {}", HotkeyError::Unsupported(fallback.as_str()));
            return Err(self.fail(error));
        }

        tracing::info!("Falling back to {} hotkey provider", fallback);
        self.state = ManagerState::FallbackAttempted {
            from: primary,
            to: fallback,
        };
        match self.start_provider(fallback).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("{} hotkey provider failed to start: {}", fallback, e);
                Err(self.fail(e))
            }
        }
    }

    /// Stop the active provider; a no-op when nothing is running
    pub async fn stop(&mut self) {
        let Some(mut provider) = self.provider.take() else {
            return;
        };
        provider.stop().await;
        self.state = ManagerState::Stopped;
        tracing::info!("Hotkey listener stopped");
    }

    /// Whether the start/stop hotkey has toggled recording on
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Apply new hotkey settings: stop, reselect, reregister, start
    pub async fn reload_config(&mut self, config: HotkeyConfig) -> Result<(), HotkeyError> {
        tracing::info!("Reloading hotkey configuration");
        self.stop().await;
        self.config = config;
        self.start().await
    }

    /// Capture one key combination from the user
    ///
    /// Providers without native capture (portal, null) delegate to a
    /// temporary evdev provider, which needs device access. In Flatpak that
    /// access never exists.
    pub async fn capture_once(&self, timeout: Duration) -> Result<String, HotkeyError> {
        if let Some(provider) = self.provider.as_ref() {
            if provider.supports_capture_once() {
                return provider.capture_once(timeout).await;
            }
        }

        if self.env.runtime.is_flatpak() {
            return Err(HotkeyError::CaptureNotSupported(
                self.active_provider().unwrap_or("dbus"),
            ));
        }

        tracing::debug!("Capturing with a temporary evdev provider");
        self.factory
            .create(ProviderKind::Evdev)
            .capture_once(timeout)
            .await
    }

    pub fn supports_capture_once(&self) -> bool {
        let native = self
            .provider
            .as_ref()
            .is_some_and(|p| p.supports_capture_once());
        native || !self.env.runtime.is_flatpak()
    }

    /// Name of the running provider ("dbus", "evdev" or "null")
    pub fn active_provider(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.name())
    }

    pub fn state(&self) -> &ManagerState {
        &self.state
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Probe every real provider that could run in this environment
    pub async fn probe(&self) -> Supported {
        let mut supported = Supported::default();
        for kind in selector::candidate_order(self.env.runtime) {
            let provider = self.factory.create(*kind);
            let ok = provider.is_supported().await;
            tracing::debug!("{} provider supported: {}", kind, ok);
            supported.set(*kind, ok);
        }
        supported
    }

    async fn select(&self) -> ProviderKind {
        let provider_override = self.config.provider();
        let supported = if provider_override == ProviderOverride::Auto {
            self.probe().await
        } else {
            tracing::debug!("Provider override '{}', skipping detection", provider_override);
            Supported::default()
        };

        let kind = selector::select_provider(provider_override, self.env.runtime, supported);
        tracing::info!(
            "Selected {} hotkey provider (runtime: {}, desktop: {:?})",
            kind,
            self.env.runtime,
            self.env.desktop
        );
        kind
    }

    /// Create, register and start one provider, making it active on success
    async fn start_provider(&mut self, kind: ProviderKind) -> Result<(), HotkeyError> {
        let mut provider = self.factory.create(kind);
        self.register_all(provider.as_mut())?;
        self.state = ManagerState::ProviderSelected { provider: kind };

        provider.start().await?;

        self.provider = Some(provider);
        self.state = ManagerState::Listening {
            provider: kind,
            since: Instant::now(),
        };
        tracing::info!(
            "Listening for {} via {}",
            self.config.start_recording_hotkey(),
            kind
        );
        Ok(())
    }

    fn register_all(&self, provider: &mut dyn HotkeyProvider) -> Result<(), HotkeyError> {
        provider.register_hotkey(&self.config.start_recording_hotkey(), self.toggle_callback())?;

        for (name, action) in &self.actions {
            let hotkey = self.config.action_hotkey(name);
            if hotkey.is_empty() {
                tracing::debug!("Action '{}' has no hotkey configured", name);
                continue;
            }
            // A bad action binding must not take the recording hotkey down with it
            if let Err(e) = provider.register_hotkey(&hotkey, action.clone()) {
                tracing::warn!("Skipping action '{}' ({}): {}", name, hotkey, e);
            }
        }
        Ok(())
    }

    fn toggle_callback(&self) -> HotkeyCallback {
        let recording = Arc::clone(&self.recording);
        let callbacks = Arc::clone(&self.callbacks);

        callback(move || {
            let was_recording = recording.fetch_xor(true, Ordering::SeqCst);
            let next = callbacks.read().ok().and_then(|c| {
                if was_recording {
                    c.on_stop.clone()
                } else {
                    c.on_start.clone()
                }
            });

            if was_recording {
                tracing::info!("Recording stopped");
            } else {
                tracing::info!("Recording started");
            }
            let Some(cb) = next else {
                return Ok(());
            };
            let result = cb();
            if result.is_err() {
                // The transition did not happen; the next press retries it
                recording.store(was_recording, Ordering::SeqCst);
            }
            result
        })
    }

    fn fail(&mut self, error: HotkeyError) -> HotkeyError {
        self.state = ManagerState::Failed {
            reason: error.to_string(),
        };
        tracing::error!("No hotkey provider could be started: {}", error);
        error
    }
}
