//! End-to-end tests for the evdev provider and key capture
//!
//! Key events are injected through an in-process `ChannelSource`, so these
//! run without /dev/input access.

use dictkey::hotkey::capture::capture_once;
use dictkey::hotkey::devices::{ChannelSource, KeyEvent, KEY_REPEAT};
use dictkey::hotkey::evdev_listener::EvdevProvider;
use dictkey::hotkey::keys::code::{KEY_A, KEY_ESC, KEY_F13, KEY_LEFTCTRL, KEY_LEFTSHIFT, KEY_R};
use dictkey::hotkey::{callback, HotkeyCallback, HotkeyProvider};
use dictkey::HotkeyError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn counter() -> (Arc<AtomicUsize>, HotkeyCallback) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let cb = callback(move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (count, cb)
}

/// Poll until `done` holds or the deadline passes
async fn wait_until(done: impl Fn() -> bool, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    done()
}

/// Let spawned callbacks run; used before asserting that nothing fired
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// ============================================================================
// Listener
// ============================================================================

#[tokio::test]
async fn modifier_combo_fires_exactly_once() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (count, cb) = counter();
    provider.register_hotkey("ctrl+r", cb).unwrap();
    provider.start().await.unwrap();

    source.press(KEY_LEFTCTRL);
    source.press(KEY_R);
    source.send(KeyEvent {
        code: KEY_R,
        value: KEY_REPEAT,
    });
    source.release(KEY_R);
    source.release(KEY_LEFTCTRL);

    assert!(wait_until(|| count.load(Ordering::SeqCst) >= 1, Duration::from_secs(2)).await);
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    provider.stop().await;
}

#[tokio::test]
async fn key_without_required_modifier_does_not_fire() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (count, cb) = counter();
    provider.register_hotkey("ctrl+r", cb).unwrap();
    provider.start().await.unwrap();

    source.press(KEY_R);
    source.release(KEY_R);
    // Released modifier no longer counts
    source.press(KEY_LEFTCTRL);
    source.release(KEY_LEFTCTRL);
    source.press(KEY_R);
    source.release(KEY_R);

    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    provider.stop().await;
}

#[tokio::test]
async fn extra_modifiers_still_match() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (count, cb) = counter();
    provider.register_hotkey("ctrl+r", cb).unwrap();
    provider.start().await.unwrap();

    source.press(KEY_LEFTCTRL);
    source.press(KEY_LEFTSHIFT);
    source.press(KEY_R);

    assert!(wait_until(|| count.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await);
    provider.stop().await;
}

#[tokio::test]
async fn bare_function_key_fires() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (f13, f13_cb) = counter();
    let (other, other_cb) = counter();
    provider.register_hotkey("F13", f13_cb).unwrap();
    provider.register_hotkey("ctrl+a", other_cb).unwrap();
    provider.start().await.unwrap();

    source.press(KEY_F13);
    source.press(KEY_A);

    assert!(wait_until(|| f13.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await);
    settle().await;
    assert_eq!(other.load(Ordering::SeqCst), 0);
    provider.stop().await;
}

#[tokio::test]
async fn stop_releases_devices_and_silences_callbacks() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (count, cb) = counter();
    provider.register_hotkey("ctrl+r", cb).unwrap();
    provider.start().await.unwrap();
    assert_eq!(source.open_handles(), 1);
    assert!(provider.is_listening());

    let started = Instant::now();
    provider.stop().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!provider.is_listening());
    assert_eq!(source.open_handles(), 0);

    source.press(KEY_LEFTCTRL);
    source.press(KEY_R);
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    // Hotkeys survive a restart
    provider.start().await.unwrap();
    source.press(KEY_LEFTCTRL);
    source.press(KEY_R);
    assert!(wait_until(|| count.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await);
    provider.stop().await;
}

#[tokio::test]
async fn slow_callback_does_not_stall_dispatch() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (fast, fast_cb) = counter();
    provider
        .register_hotkey(
            "f13",
            callback(|| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            }),
        )
        .unwrap();
    provider.register_hotkey("ctrl+r", fast_cb).unwrap();
    provider.start().await.unwrap();

    source.press(KEY_F13);
    source.press(KEY_LEFTCTRL);
    source.press(KEY_R);

    assert!(wait_until(|| fast.load(Ordering::SeqCst) == 1, Duration::from_millis(300)).await);
    provider.stop().await;
}

#[tokio::test]
async fn failing_callback_keeps_listener_alive() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (count, _) = counter();
    let c = Arc::clone(&count);
    provider
        .register_hotkey(
            "ctrl+r",
            callback(move || {
                c.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("recorder not ready")
            }),
        )
        .unwrap();
    provider.start().await.unwrap();

    source.press(KEY_LEFTCTRL);
    source.press(KEY_R);
    source.release(KEY_R);
    source.press(KEY_R);

    assert!(wait_until(|| count.load(Ordering::SeqCst) == 2, Duration::from_secs(2)).await);
    provider.stop().await;
}

// ============================================================================
// Capture
// ============================================================================

/// Run a capture in the background and wait until it holds a device handle
async fn begin_capture(
    source: Arc<ChannelSource>,
    timeout: Duration,
) -> tokio::task::JoinHandle<Result<String, HotkeyError>> {
    let before = source.open_handles();
    let task_source = Arc::clone(&source);
    let task = tokio::spawn(async move { capture_once(task_source.as_ref(), timeout).await });
    assert!(
        wait_until(|| source.open_handles() > before, Duration::from_secs(2)).await,
        "capture never opened the device"
    );
    task
}

#[tokio::test]
async fn capture_returns_combination() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let task = begin_capture(source.clone(), Duration::from_secs(5)).await;

    source.press(KEY_LEFTCTRL);
    source.press(KEY_LEFTSHIFT);
    source.press(KEY_R);

    assert_eq!(task.await.unwrap().unwrap(), "ctrl+shift+r");
    assert_eq!(source.open_handles(), 0);
}

#[tokio::test]
async fn capture_bare_escape_cancels() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let task = begin_capture(source.clone(), Duration::from_secs(5)).await;

    source.press(KEY_ESC);

    let result = task.await.unwrap();
    assert!(matches!(result, Err(HotkeyError::CaptureCancelled)));
    assert!(result.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn capture_ctrl_escape_is_a_combination() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let task = begin_capture(source.clone(), Duration::from_secs(5)).await;

    source.press(KEY_LEFTCTRL);
    source.press(KEY_ESC);

    assert_eq!(task.await.unwrap().unwrap(), "ctrl+escape");
}

#[tokio::test]
async fn capture_rejects_bare_typing_key() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let task = begin_capture(source.clone(), Duration::from_secs(5)).await;

    source.press(KEY_A);

    assert!(matches!(
        task.await.unwrap(),
        Err(HotkeyError::InvalidCapture(_))
    ));
}

#[tokio::test]
async fn capture_times_out() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let started = Instant::now();
    let result = capture_once(source.as_ref(), Duration::from_millis(100)).await;

    let err = result.unwrap_err();
    assert!(err.is_timeout(), "{:?}", err);
    assert!(!err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(source.open_handles(), 0);
}

#[tokio::test]
async fn capture_without_keyboards_fails_immediately() {
    let source = ChannelSource::empty();
    let started = Instant::now();
    let result = capture_once(&source, Duration::from_secs(30)).await;

    assert!(matches!(result, Err(HotkeyError::NoKeyboard)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn capture_leaves_running_listener_untouched() {
    let source = Arc::new(ChannelSource::new("test keyboard"));
    let mut provider = EvdevProvider::new(source.clone());
    let (count, cb) = counter();
    provider.register_hotkey("ctrl+r", cb).unwrap();
    provider.start().await.unwrap();

    let task = begin_capture(source.clone(), Duration::from_secs(5)).await;
    source.press(KEY_LEFTCTRL);
    source.press(KEY_R);

    assert_eq!(task.await.unwrap().unwrap(), "ctrl+r");
    // The listener saw the same keys independently
    assert!(wait_until(|| count.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await);
    assert_eq!(source.open_handles(), 1);
    provider.stop().await;
}
