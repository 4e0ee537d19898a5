//! Keyboard device discovery and the device abstraction used by listeners
//!
//! The raw-device provider and capture sessions never touch evdev directly;
//! they ask a [`DeviceSource`] for fresh keyboard handles. On Linux the
//! default source scans `/dev/input/event*`. [`ChannelSource`] feeds
//! synthetic key events in-process.

use crate::error::HotkeyError;
use std::io;
use tokio::sync::broadcast;

/// Key event value for a release
pub const KEY_RELEASE: i32 = 0;
/// Key event value for a press
pub const KEY_PRESS: i32 = 1;
/// Key event value for autorepeat
pub const KEY_REPEAT: i32 = 2;

/// A single EV_KEY event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Linux key code (`KEY_*`)
    pub code: u16,
    /// 0 = up, 1 = down, 2 = repeat
    pub value: i32,
}

impl KeyEvent {
    pub fn press(code: u16) -> Self {
        Self {
            code,
            value: KEY_PRESS,
        }
    }

    pub fn release(code: u16) -> Self {
        Self {
            code,
            value: KEY_RELEASE,
        }
    }
}

/// An open keyboard handle
///
/// Dropping the handle closes the underlying device.
#[async_trait::async_trait]
pub trait KeyboardDevice: Send {
    /// Device name as reported by the kernel
    fn name(&self) -> &str;

    /// Wait for the next key event, skipping non-key events
    async fn next_key(&mut self) -> io::Result<KeyEvent>;
}

/// Something that can enumerate and open keyboards
pub trait DeviceSource: Send + Sync {
    /// Open every keyboard currently present
    ///
    /// Each call returns new, independent handles.
    fn open_keyboards(&self) -> Result<Vec<Box<dyn KeyboardDevice>>, HotkeyError>;

    /// Cheap probe: at least one keyboard can be opened
    fn has_keyboards(&self) -> bool;
}

/// Keyboard classification heuristic used during discovery
///
/// A device is a keyboard if its name says so, or if it reports EV_KEY
/// together with common letter/space keys (mice and joysticks do not).
pub fn looks_like_keyboard(name: &str, has_key_events: bool, has_typing_keys: bool) -> bool {
    name.to_lowercase().contains("keyboard") || (has_key_events && has_typing_keys)
}

/// In-process device source backed by a broadcast channel
///
/// Every opened handle sees events sent after it was opened.
pub struct ChannelSource {
    name: String,
    keyboards: usize,
    tx: broadcast::Sender<KeyEvent>,
}

impl ChannelSource {
    /// A source exposing a single keyboard
    pub fn new(name: &str) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            name: name.to_string(),
            keyboards: 1,
            tx,
        }
    }

    /// A source with no keyboards at all
    pub fn empty() -> Self {
        Self {
            keyboards: 0,
            ..Self::new("none")
        }
    }

    /// Deliver an event to every open handle
    pub fn send(&self, event: KeyEvent) {
        // No receivers simply means nothing is listening yet
        let _ = self.tx.send(event);
    }

    pub fn press(&self, code: u16) {
        self.send(KeyEvent::press(code));
    }

    pub fn release(&self, code: u16) {
        self.send(KeyEvent::release(code));
    }

    /// Number of handles currently open
    pub fn open_handles(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl DeviceSource for ChannelSource {
    fn open_keyboards(&self) -> Result<Vec<Box<dyn KeyboardDevice>>, HotkeyError> {
        Ok((0..self.keyboards)
            .map(|_| {
                Box::new(ChannelDevice {
                    name: self.name.clone(),
                    rx: self.tx.subscribe(),
                }) as Box<dyn KeyboardDevice>
            })
            .collect())
    }

    fn has_keyboards(&self) -> bool {
        self.keyboards > 0
    }
}

struct ChannelDevice {
    name: String,
    rx: broadcast::Receiver<KeyEvent>,
}

#[async_trait::async_trait]
impl KeyboardDevice for ChannelDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_key(&mut self) -> io::Result<KeyEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("{}: dropped {} key events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device closed"));
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
pub use self::linux::EvdevSource;

#[cfg(target_os = "linux")]
mod linux {
    use super::{looks_like_keyboard, DeviceSource, KeyEvent, KeyboardDevice};
    use crate::error::HotkeyError;
    use evdev::{Device, EventStream, EventType, InputEventKind, Key};
    use std::io;
    use std::path::PathBuf;

    /// Scans `/dev/input/event*` for keyboards
    pub struct EvdevSource {
        input_dir: PathBuf,
    }

    impl Default for EvdevSource {
        fn default() -> Self {
            Self {
                input_dir: PathBuf::from("/dev/input"),
            }
        }
    }

    impl EvdevSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Find all keyboard input devices, already opened
        fn find_keyboard_devices(&self) -> Result<Vec<(PathBuf, Device)>, HotkeyError> {
            let mut keyboards = Vec::new();
            let mut denied: Option<PathBuf> = None;

            let input_dir = std::fs::read_dir(&self.input_dir).map_err(|e| {
                HotkeyError::DeviceAccess(format!("{}: {}", self.input_dir.display(), e))
            })?;

            for entry in input_dir.flatten() {
                let path = entry.path();

                // Only look at event* devices
                let is_event_device = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("event"))
                    .unwrap_or(false);

                if !is_event_device {
                    continue;
                }

                match Device::open(&path) {
                    Ok(device) => {
                        let name = device.name().unwrap_or("unknown").to_string();
                        let has_key_events = device.supported_events().contains(EventType::KEY);
                        let has_typing_keys = device
                            .supported_keys()
                            .map(|keys| {
                                [Key::KEY_A, Key::KEY_Z, Key::KEY_Q, Key::KEY_SPACE]
                                    .iter()
                                    .any(|k| keys.contains(*k))
                            })
                            .unwrap_or(false);

                        if looks_like_keyboard(&name, has_key_events, has_typing_keys) {
                            tracing::debug!("Found keyboard: {:?} ({})", path, name);
                            keyboards.push((path, device));
                        } else {
                            tracing::trace!("Skipping non-keyboard {:?} ({})", path, name);
                        }
                    }
                    Err(e) => {
                        // Permission denied is common for non-input-group users
                        if e.kind() == io::ErrorKind::PermissionDenied && denied.is_none() {
                            denied = Some(path.clone());
                        }
                        tracing::trace!("Skipping {:?}: {}", path, e);
                    }
                }
            }

            if keyboards.is_empty() {
                if let Some(path) = denied {
                    return Err(HotkeyError::DeviceAccess(path.display().to_string()));
                }
            }

            Ok(keyboards)
        }
    }

    impl DeviceSource for EvdevSource {
        fn open_keyboards(&self) -> Result<Vec<Box<dyn KeyboardDevice>>, HotkeyError> {
            let mut opened: Vec<Box<dyn KeyboardDevice>> = Vec::new();

            for (path, device) in self.find_keyboard_devices()? {
                let name = device.name().unwrap_or("unknown").to_string();
                match device.into_event_stream() {
                    Ok(stream) => {
                        tracing::debug!("Opened device: {:?} ({})", path, name);
                        opened.push(Box::new(EvdevKeyboard { name, stream }));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to open {:?}: {}", path, e);
                    }
                }
            }

            if opened.is_empty() {
                return Err(HotkeyError::NoKeyboard);
            }
            Ok(opened)
        }

        fn has_keyboards(&self) -> bool {
            // Handles are closed again as soon as the probe returns
            matches!(self.find_keyboard_devices(), Ok(devices) if !devices.is_empty())
        }
    }

    struct EvdevKeyboard {
        name: String,
        stream: EventStream,
    }

    #[async_trait::async_trait]
    impl KeyboardDevice for EvdevKeyboard {
        fn name(&self) -> &str {
            &self.name
        }

        async fn next_key(&mut self) -> io::Result<KeyEvent> {
            loop {
                let event = self.stream.next_event().await?;
                if let InputEventKind::Key(key) = event.kind() {
                    return Ok(KeyEvent {
                        code: key.code(),
                        value: event.value(),
                    });
                }
            }
        }
    }
}
