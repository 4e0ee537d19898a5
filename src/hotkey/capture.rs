//! Capture one key combination for interactive rebinding
//!
//! A capture session opens its own device handles and keeps its own
//! modifier state, so a running listener is never disturbed. It resolves on
//! the first non-modifier key-down. Bare Escape cancels.

use super::devices::{DeviceSource, KeyboardDevice, KEY_PRESS};
use super::evdev_listener::{track_modifier, STOP_TIMEOUT};
use super::keys;
use crate::error::HotkeyError;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// What a capture listener saw
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Combination(String),
    Cancelled,
}

/// Wait up to `timeout` for one key combination on any keyboard of `source`
///
/// Returns the canonical hotkey string (e.g. `ctrl+shift+r`).
pub async fn capture_once(
    source: &dyn DeviceSource,
    timeout: Duration,
) -> Result<String, HotkeyError> {
    let devices = source.open_keyboards()?;
    if devices.is_empty() {
        return Err(HotkeyError::NoKeyboard);
    }

    tracing::debug!("Capturing key combination on {} device(s)", devices.len());

    let (result_tx, mut result_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let modifiers = Arc::new(Mutex::new(HashMap::new()));

    let listeners: Vec<_> = devices
        .into_iter()
        .map(|device| {
            tokio::spawn(capture_listener(
                device,
                Arc::clone(&modifiers),
                result_tx.clone(),
                stop_rx.clone(),
            ))
        })
        .collect();
    // Only listeners hold senders now; recv() yields None once all have exited
    drop(result_tx);

    let outcome = tokio::time::timeout(timeout, result_rx.recv()).await;

    // Release the devices before returning, whatever the outcome
    let _ = stop_tx.send(true);
    drop(stop_tx);
    if tokio::time::timeout(STOP_TIMEOUT, join_all(listeners))
        .await
        .is_err()
    {
        tracing::warn!("Capture listeners did not exit within {:?}", STOP_TIMEOUT);
    }

    match outcome {
        Err(_) => Err(HotkeyError::CaptureTimeout(timeout)),
        Ok(None) => Err(HotkeyError::Evdev(
            "all keyboards closed during capture".to_string(),
        )),
        Ok(Some(Outcome::Cancelled)) => Err(HotkeyError::CaptureCancelled),
        Ok(Some(Outcome::Combination(hotkey))) => {
            validate_capture(&hotkey)?;
            tracing::info!("Captured hotkey: {}", hotkey);
            Ok(hotkey)
        }
    }
}

/// Reject combinations that would swallow ordinary typing
///
/// A hotkey with no modifiers must not be a letter, digit, punctuation or
/// whitespace key. Bare function, lock and media keys are fine.
pub fn validate_capture(hotkey: &str) -> Result<(), HotkeyError> {
    let combo = keys::parse_hotkey(hotkey);
    if combo.key.is_empty() || (combo.is_bare() && keys::is_typing_key(&combo.key)) {
        return Err(HotkeyError::InvalidCapture(hotkey.to_string()));
    }
    Ok(())
}

async fn capture_listener(
    mut device: Box<dyn KeyboardDevice>,
    modifiers: Arc<Mutex<HashMap<String, bool>>>,
    result_tx: mpsc::Sender<Outcome>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            event = device.next_key() => match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!("{}: capture read ended: {}", device.name(), e);
                    return;
                }
            }
        };

        let Ok(mut held) = modifiers.lock() else {
            return;
        };
        if track_modifier(&mut held, event) || event.value != KEY_PRESS {
            continue;
        }

        let Some(key) = keys::key_name(event.code) else {
            continue;
        };

        let any_modifier = held.values().any(|pressed| *pressed);
        let outcome = if key == "escape" && !any_modifier {
            Outcome::Cancelled
        } else {
            Outcome::Combination(keys::combination_string(key, &held))
        };
        drop(held);

        // Capacity 1: the first keyboard to resolve wins
        let _ = result_tx.try_send(outcome);
        return;
    }
}
