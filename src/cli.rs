// Command-line interface definitions for dictkey
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dictkey")]
#[command(author, version, about = "Global dictation hotkeys for Linux desktops")]
#[command(long_about = "
dictkey listens for a global hotkey that starts and stops dictation, on any
Linux desktop: through the XDG desktop portal where the compositor offers
GlobalShortcuts (GNOME 48+, KDE, Hyprland, Flatpak), or by reading input
devices directly everywhere else.

SETUP:
  1. Run: dictkey detect (to see which backend will be used)
  2. For the evdev backend: sudo usermod -aG input $USER, then log out and in
  3. Run: dictkey config --init (to write a config file)
  4. Run: dictkey (to start the daemon)

USAGE:
  Press Ctrl+Alt+R (default) to start recording, press again to stop.
  Use `dictkey capture` to find the name of a key combination.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the recording hotkey (e.g., ctrl+alt+r, super+d, f13)
    #[arg(long, value_name = "HOTKEY")]
    pub hotkey: Option<String>,

    /// Force a hotkey backend: auto, dbus or evdev
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Press a key combination and print its hotkey string
    Capture {
        /// Seconds to wait for a key combination
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Show runtime environment and which hotkey backend would be used
    Detect {
        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show current configuration
    Config {
        /// Write a commented default config file
        #[arg(long)]
        init: bool,
    },
}
