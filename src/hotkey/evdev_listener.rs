//! evdev-based hotkey provider
//!
//! Uses the Linux evdev interface to detect key presses at the kernel level.
//! This works on all Wayland compositors because it bypasses the display server.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.
//!
//! One listener task runs per keyboard. Modifier state is shared between
//! them, so Ctrl on one keyboard plus R on another still matches.

use super::capture;
use super::devices::{DeviceSource, KeyEvent, KeyboardDevice, KEY_PRESS, KEY_RELEASE};
use super::keys::{self, KeyCombination};
use super::{dispatch, HotkeyCallback, HotkeyProvider};
use crate::error::HotkeyError;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long `stop()` waits for listener tasks before detaching them
pub const STOP_TIMEOUT: Duration = Duration::from_millis(500);

struct Registration {
    combo: KeyCombination,
    callback: HotkeyCallback,
}

/// Callback table and modifier state, guarded together
#[derive(Default)]
struct ListenerState {
    hotkeys: HashMap<String, Registration>,
    modifiers: HashMap<String, bool>,
}

/// evdev-based hotkey provider
pub struct EvdevProvider {
    /// Where keyboards come from
    source: Arc<dyn DeviceSource>,
    state: Arc<RwLock<ListenerState>>,
    /// Signal to stop the listener tasks, re-created on every start
    stop_signal: Option<watch::Sender<bool>>,
    /// Set while stopping, so errors from closed devices are expected
    stopping: Arc<AtomicBool>,
    listeners: Vec<JoinHandle<()>>,
}

impl EvdevProvider {
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self {
            source,
            state: Arc::new(RwLock::new(ListenerState::default())),
            stop_signal: None,
            stopping: Arc::new(AtomicBool::new(false)),
            listeners: Vec::new(),
        }
    }

    /// Number of registered hotkeys
    pub fn hotkey_count(&self) -> usize {
        self.state.read().map(|s| s.hotkeys.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl HotkeyProvider for EvdevProvider {
    fn name(&self) -> &'static str {
        "evdev"
    }

    async fn is_supported(&self) -> bool {
        self.source.has_keyboards()
    }

    async fn start(&mut self) -> Result<(), HotkeyError> {
        if self.stop_signal.is_some() {
            return Err(HotkeyError::AlreadyStarted);
        }

        let devices = self.source.open_keyboards()?;
        if devices.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        self.stopping.store(false, Ordering::SeqCst);

        // Modifiers held across a restart would otherwise stay stuck
        if let Ok(mut state) = self.state.write() {
            state.modifiers.clear();
        }

        let device_count = devices.len();
        self.listeners = devices
            .into_iter()
            .map(|device| {
                tokio::spawn(listen(
                    device,
                    Arc::clone(&self.state),
                    stop_rx.clone(),
                    Arc::clone(&self.stopping),
                ))
            })
            .collect();
        self.stop_signal = Some(stop_tx);

        tracing::info!(
            "Listening on {} keyboard device(s) for {} hotkey(s)",
            device_count,
            self.hotkey_count()
        );
        Ok(())
    }

    async fn stop(&mut self) {
        let Some(stop) = self.stop_signal.take() else {
            return;
        };

        self.stopping.store(true, Ordering::SeqCst);
        let _ = stop.send(true);
        drop(stop);

        let listeners = std::mem::take(&mut self.listeners);
        let count = listeners.len();
        let mut pending = Box::pin(join_all(listeners));

        if tokio::time::timeout(STOP_TIMEOUT, &mut pending).await.is_err() {
            tracing::warn!(
                "{} listener(s) did not exit within {:?}, finishing cleanup in background",
                count,
                STOP_TIMEOUT
            );
            tokio::spawn(async move {
                pending.await;
                tracing::debug!("Background listener cleanup finished");
            });
        } else {
            tracing::debug!("All {} listener(s) stopped", count);
        }
    }

    fn register_hotkey(
        &mut self,
        hotkey: &str,
        callback: HotkeyCallback,
    ) -> Result<(), HotkeyError> {
        let combo = keys::parse_hotkey(hotkey);

        if combo.key.is_empty() || keys::key_code(&combo.key).is_none() {
            return Err(HotkeyError::UnknownKey(hotkey.to_string()));
        }
        // Modifier key-downs only update modifier state and never match
        if keys::is_modifier(&combo.key) {
            return Err(HotkeyError::UnknownKey(hotkey.to_string()));
        }
        if let Some(bad) = combo.modifiers.iter().find(|m| !keys::is_modifier(m)) {
            return Err(HotkeyError::UnknownKey(bad.clone()));
        }

        let id = combo.to_string();
        let mut state = self
            .state
            .write()
            .map_err(|_| HotkeyError::Evdev("listener state lock poisoned".into()))?;

        if state.hotkeys.contains_key(&id) {
            return Err(HotkeyError::AlreadyRegistered(id));
        }

        tracing::debug!("Registered hotkey: {}", id);
        state.hotkeys.insert(id, Registration { combo, callback });
        Ok(())
    }

    async fn capture_once(&self, timeout: Duration) -> Result<String, HotkeyError> {
        capture::capture_once(self.source.as_ref(), timeout).await
    }

    fn supports_capture_once(&self) -> bool {
        true
    }

    fn is_listening(&self) -> bool {
        self.stop_signal.is_some()
    }
}

/// Update `modifiers` if `event` is a modifier key; returns true if it was one
pub(crate) fn track_modifier(modifiers: &mut HashMap<String, bool>, event: KeyEvent) -> bool {
    let Some(name) = keys::modifier_name(event.code) else {
        return false;
    };
    match event.value {
        KEY_PRESS => {
            modifiers.insert(name.to_string(), true);
        }
        KEY_RELEASE => {
            modifiers.insert(name.to_string(), false);
        }
        // Repeat - no change
        _ => {}
    }
    true
}

/// Listener loop for one device
async fn listen(
    mut device: Box<dyn KeyboardDevice>,
    state: Arc<RwLock<ListenerState>>,
    mut stop_rx: watch::Receiver<bool>,
    stopping: Arc<AtomicBool>,
) {
    let name = device.name().to_string();
    tracing::debug!("Listener started: {}", name);

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => {
                tracing::debug!("Listener stopping: {}", name);
                return;
            }

            event = device.next_key() => match event {
                Ok(event) => {
                    for (hotkey, callback) in handle_event(&state, event) {
                        tracing::debug!("Hotkey pressed: {}", hotkey);
                        dispatch(&hotkey, callback);
                    }
                }
                Err(e) => {
                    if stopping.load(Ordering::SeqCst) {
                        tracing::debug!("{}: read ended during stop: {}", name, e);
                    } else {
                        tracing::warn!("{}: read failed, listener exiting: {}", name, e);
                    }
                    return;
                }
            }
        }
    }
}

/// Apply one event and return the callbacks it triggers
///
/// Matching works on a snapshot so no lock is held while callbacks run.
fn handle_event(state: &RwLock<ListenerState>, event: KeyEvent) -> Vec<(String, HotkeyCallback)> {
    if keys::modifier_name(event.code).is_some() {
        if let Ok(mut state) = state.write() {
            track_modifier(&mut state.modifiers, event);
        }
        return Vec::new();
    }

    if event.value != KEY_PRESS {
        return Vec::new();
    }

    let Some(key) = keys::key_name(event.code) else {
        tracing::trace!("Ignoring unmapped key code {}", event.code);
        return Vec::new();
    };

    let (hotkeys, modifiers) = match state.read() {
        Ok(state) => (
            state
                .hotkeys
                .iter()
                .map(|(id, r)| (id.clone(), r.combo.clone(), Arc::clone(&r.callback)))
                .collect::<Vec<_>>(),
            state.modifiers.clone(),
        ),
        Err(_) => return Vec::new(),
    };

    hotkeys
        .into_iter()
        .filter(|(_, combo, _)| combo.matches(key, &modifiers))
        .map(|(id, _, callback)| (id, callback))
        .collect()
}
