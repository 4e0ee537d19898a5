//! State machine for the hotkey manager
//!
//! Uninitialized → ProviderSelected → Listening → Stopped
//!
//! and on a failed start:
//!
//! ProviderSelected → FallbackAttempted → Listening | Failed

use crate::hotkey::ProviderKind;
use std::time::Instant;

/// Hotkey manager state
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerState {
    /// Nothing selected yet
    Uninitialized,

    /// A provider was chosen and has its hotkeys, but is not running
    ProviderSelected { provider: ProviderKind },

    /// Primary failed to start; trying the fallback
    FallbackAttempted {
        from: ProviderKind,
        to: ProviderKind,
    },

    /// A provider is delivering activations
    Listening {
        provider: ProviderKind,
        /// When listening started
        since: Instant,
    },

    /// No provider could be started
    Failed { reason: String },

    /// Stopped by the user; `start()` may be called again
    Stopped,
}

impl ManagerState {
    pub fn new() -> Self {
        ManagerState::Uninitialized
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, ManagerState::Listening { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ManagerState::Failed { .. })
    }

    /// The provider this state refers to, if any
    pub fn provider(&self) -> Option<ProviderKind> {
        match self {
            ManagerState::ProviderSelected { provider } | ManagerState::Listening { provider, .. } => {
                Some(*provider)
            }
            ManagerState::FallbackAttempted { to, .. } => Some(*to),
            _ => None,
        }
    }

    /// How long the current provider has been listening
    pub fn listening_duration(&self) -> Option<std::time::Duration> {
        match self {
            ManagerState::Listening { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }
}

impl Default for ManagerState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerState::Uninitialized => write!(f, "Uninitialized"),
            ManagerState::ProviderSelected { provider } => {
                write!(f, "Provider selected ({})", provider)
            }
            ManagerState::FallbackAttempted { from, to } => {
                write!(f, "Falling back ({} → {})", from, to)
            }
            ManagerState::Listening { provider, since } => {
                write!(
                    f,
                    "Listening ({}, {:.1}s)",
                    provider,
                    since.elapsed().as_secs_f32()
                )
            }
            ManagerState::Failed { reason } => write!(f, "Failed: {}", reason),
            ManagerState::Stopped => write!(f, "Stopped"),
        }
    }
}
