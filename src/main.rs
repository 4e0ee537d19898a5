//! dictkey - global dictation hotkeys for Linux
//!
//! Run with `dictkey` or `dictkey daemon` to start the daemon.
//! Use `dictkey detect` to see which hotkey backend applies.
//! Use `dictkey capture` to find the name of a key combination.

use clap::Parser;
use dictkey::config::{self, Config, ProviderOverride};
use dictkey::hotkey::selector;
use dictkey::{Cli, Commands, Daemon, HotkeyError, HotkeyManager};
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("dictkey={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(ref hotkey) = cli.hotkey {
        config.hotkey.start_recording = hotkey.clone();
    }
    let provider_override = cli
        .provider
        .as_deref()
        .map(str::parse::<ProviderOverride>)
        .transpose()?;
    if let Some(provider) = provider_override {
        config.hotkey.provider = provider;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = Daemon::new(config, cli.config.clone())
                .with_hotkey_override(cli.hotkey.clone())
                .with_provider_override(provider_override);
            daemon.run().await?;
        }

        Commands::Capture { timeout } => {
            run_capture(&config, Duration::from_secs(timeout)).await?;
        }

        Commands::Detect { format } => {
            run_detect(&config, &format).await?;
        }

        Commands::Config { init } => {
            if init {
                init_config(cli.config.as_deref())?;
            } else {
                show_config(&config, cli.config.as_deref())?;
            }
        }
    }

    Ok(())
}

/// Capture one key combination and print it
async fn run_capture(config: &Config, timeout: Duration) -> anyhow::Result<()> {
    let manager = HotkeyManager::new(config.hotkey.clone());
    if !manager.supports_capture_once() {
        anyhow::bail!("Key capture needs input device access, which is unavailable here");
    }

    eprintln!(
        "Press the key combination to use (Esc to cancel, {}s timeout)...",
        timeout.as_secs()
    );

    match manager.capture_once(timeout).await {
        Ok(hotkey) => {
            println!("{}", hotkey);
            Ok(())
        }
        Err(HotkeyError::CaptureCancelled) => {
            eprintln!("Cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Serialize)]
struct DetectReport {
    runtime: String,
    desktop: String,
    override_provider: String,
    portal_supported: bool,
    evdev_supported: bool,
    selected: String,
    fallback: Option<String>,
}

/// Report what provider selection would do here
async fn run_detect(config: &Config, format: &str) -> anyhow::Result<()> {
    let manager = HotkeyManager::new(config.hotkey.clone());
    let env = manager.environment().clone();
    let supported = manager.probe().await;
    let selected = selector::select_provider(config.hotkey.provider(), env.runtime, supported);
    let fallback = selector::fallback_for(selected, &env);

    let report = DetectReport {
        runtime: env.runtime.to_string(),
        desktop: env.desktop.clone(),
        override_provider: config.hotkey.provider().to_string(),
        portal_supported: supported.portal,
        evdev_supported: supported.evdev,
        selected: selected.to_string(),
        fallback: fallback.map(|k| k.to_string()),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("Runtime:          {}", report.runtime);
    println!(
        "Desktop:          {}",
        if report.desktop.is_empty() {
            "(unknown)"
        } else {
            report.desktop.as_str()
        }
    );
    println!("Provider setting: {}", report.override_provider);
    println!("Portal supported: {}", yes_no(report.portal_supported));
    println!("Evdev supported:  {}", yes_no(report.evdev_supported));
    println!("Selected:         {}", report.selected);
    println!(
        "Fallback:         {}",
        report.fallback.as_deref().unwrap_or("none")
    );

    if selected == dictkey::ProviderKind::Null {
        println!("\nNo working hotkey backend. To fix:");
        for step in dictkey::hotkey::null::remediation_steps(&env) {
            println!("  - {}", step);
        }
    }

    Ok(())
}

fn init_config(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine config directory"))?,
    };
    config::write_default_config(&path)?;
    println!("Wrote default config to {:?}", path);
    Ok(())
}

fn show_config(config: &Config, path: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[hotkey]");
    println!("  start_recording = {:?}", config.hotkey.start_recording);
    println!("  provider = {:?}", config.hotkey.provider.to_string());

    if !config.hotkey.actions.is_empty() {
        println!("\n[hotkey.actions]");
        let mut actions: Vec<_> = config.hotkey.actions.iter().collect();
        actions.sort();
        for (name, hotkey) in actions {
            println!("  {} = {:?}", name, hotkey);
        }
    }

    println!("\n---");
    let file = path.map(|p| p.to_path_buf()).or_else(Config::default_path);
    match file {
        Some(f) if f.exists() => println!("Config file: {:?}", f),
        Some(f) => println!("Config file: {:?} (not found, using defaults)", f),
        None => println!("Config file: (none)"),
    }

    Ok(())
}
