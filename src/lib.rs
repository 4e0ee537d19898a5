//! dictkey: global dictation hotkeys for Linux desktops
//!
//! This library provides:
//! - Hotkey parsing and normalization (`ctrl+alt+r`, `super+f13`, ...)
//! - A desktop-portal provider using the XDG `GlobalShortcuts` D-Bus interface
//! - An evdev provider reading `/dev/input/event*` directly
//! - A null provider that explains how to get a working backend
//! - Environment-aware selection with fallback, owned by [`HotkeyManager`]
//! - One-shot key capture for rebinding
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────────────────┐
//!                    │               Daemon                │
//!                    │   SIGHUP reload · SIGINT/SIGTERM    │
//!                    └─────────────────────────────────────┘
//!                                      │
//!                                      ▼
//!                    ┌─────────────────────────────────────┐
//!                    │            HotkeyManager            │
//!                    │  select ─▶ register ─▶ start ─┐     │
//!                    │              fallback ◀───────┘     │
//!                    └─────────────────────────────────────┘
//!                                      │
//!            ┌─────────────────────────┼─────────────────────────┐
//!            ▼                         ▼                         ▼
//!   ┌────────────────┐        ┌────────────────┐        ┌────────────────┐
//!   │     Portal     │        │     Evdev      │        │      Null      │
//!   │ (zbus, D-Bus)  │        │ (/dev/input/*) │        │  (never fires) │
//!   └────────────────┘        └────────────────┘        └────────────────┘
//!            │                         │
//!            │ Activated(id)           │ key events + modifier state
//!            ▼                         ▼
//!   ┌─────────────────────────────────────────────────────────────────┐
//!   │     callbacks (blocking pool): toggle recording, named actions  │
//!   └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod daemon;
pub mod environment;
pub mod error;
pub mod hotkey;
pub mod manager;
pub mod state;

pub use cli::{Cli, Commands};
pub use config::{Config, HotkeyConfig, ProviderOverride};
pub use daemon::Daemon;
pub use environment::{Environment, RuntimeKind};
pub use error::{DictkeyError, HotkeyError, Result};
pub use hotkey::{callback, HotkeyCallback, HotkeyProvider, ProviderKind};
pub use manager::HotkeyManager;
pub use state::ManagerState;
