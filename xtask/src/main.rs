//! Development tasks for dictkey
//!
//! Usage:
//!   cargo xtask install [--prefix DIR]  Install binary and man pages (default /usr/local)
//!   cargo xtask uninstall [--prefix DIR]
//!   cargo xtask man                     Generate man pages into target/man
//!   cargo xtask dist                    Build a release tarball under target/dist

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const BIN: &str = "dictkey";
const MAN_PAGES: &[&str] = &[
    "dictkey.1",
    "dictkey-daemon.1",
    "dictkey-capture.1",
    "dictkey-detect.1",
    "dictkey-config.1",
];

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(command) = args.first() else {
        print_help();
        return ExitCode::SUCCESS;
    };

    let prefix = args
        .windows(2)
        .find(|w| w[0] == "--prefix")
        .map(|w| PathBuf::from(&w[1]))
        .unwrap_or_else(|| PathBuf::from("/usr/local"));

    let result = match command.as_str() {
        "install" => install(&prefix),
        "uninstall" => uninstall(&prefix),
        "man" => man().map(|dir| println!("Man pages in {}", dir.display())),
        "dist" => dist(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    eprintln!(
        r#"
dictkey development tasks

Usage: cargo xtask <COMMAND> [OPTIONS]

Commands:
  install    Build release binary, install it and its man pages (requires sudo)
  uninstall  Remove installed binary and man pages (requires sudo)
  man        Generate man pages into target/man
  dist       Build a release tarball under target/dist

Options:
  --prefix DIR   Install prefix (default: /usr/local)
"#
    );
}

/// Get the project root directory
fn project_root() -> anyhow::Result<PathBuf> {
    let dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => env::current_dir()?,
    };

    // xtask is in a subdirectory, go up one level
    Ok(dir.parent().unwrap_or(&dir).to_path_buf())
}

/// Release build with man page generation turned on
fn build_release(root: &Path) -> anyhow::Result<PathBuf> {
    println!("==> Building release binary...");

    let status = Command::new("cargo")
        .args(["build", "--release", "--bin", BIN])
        .env("DICTKEY_GEN_MANPAGES", "1")
        .current_dir(root)
        .status()?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let binary = root.join("target/release").join(BIN);
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }
    Ok(binary)
}

/// Find the man pages build.rs rendered into OUT_DIR and copy them to target/man
fn man() -> anyhow::Result<PathBuf> {
    let root = project_root()?;
    build_release(&root)?;

    let build_dir = root.join("target/release/build");
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(&build_dir)? {
        let candidate = entry?.path().join("out/man");
        if !candidate.join("dictkey.1").exists() {
            continue;
        }
        let modified = std::fs::metadata(candidate.join("dictkey.1"))?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, candidate));
        }
    }
    let Some((_, source)) = newest else {
        anyhow::bail!("No generated man pages under {:?}", build_dir);
    };

    let dest = root.join("target/man");
    std::fs::create_dir_all(&dest)?;
    for page in MAN_PAGES {
        let from = source.join(page);
        if from.exists() {
            std::fs::copy(&from, dest.join(page))?;
        }
    }
    Ok(dest)
}

fn sudo(args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new("sudo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("'sudo {}' failed", args.join(" "));
    }
    Ok(())
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("Non-UTF-8 path: {:?}", path))
}

/// Build and install binary and man pages under `prefix`
fn install(prefix: &Path) -> anyhow::Result<()> {
    let root = project_root()?;
    let man_dir = man()?;
    let binary = root.join("target/release").join(BIN);

    let bin_dest = prefix.join("bin").join(BIN);
    println!("==> Installing to {}...", bin_dest.display());
    sudo(&["install", "-Dm755", path_str(&binary)?, path_str(&bin_dest)?])?;

    let man_dest = prefix.join("share/man/man1");
    for page in MAN_PAGES {
        let from = man_dir.join(page);
        if from.exists() {
            sudo(&[
                "install",
                "-Dm644",
                path_str(&from)?,
                path_str(&man_dest.join(page))?,
            ])?;
        }
    }

    println!("==> Installed successfully!");
    println!();
    println!("Next: dictkey detect");

    let _ = Command::new(&bin_dest).arg("--version").status();
    Ok(())
}

/// Remove what `install` put under `prefix`
fn uninstall(prefix: &Path) -> anyhow::Result<()> {
    let bin = prefix.join("bin").join(BIN);
    println!("==> Removing {}...", bin.display());
    sudo(&["rm", "-f", path_str(&bin)?])?;

    for page in MAN_PAGES {
        let path = prefix.join("share/man/man1").join(page);
        sudo(&["rm", "-f", path_str(&path)?])?;
    }

    println!("==> Uninstalled successfully!");
    Ok(())
}

/// Release tarball: binary, man pages, README and LICENSE
fn dist() -> anyhow::Result<()> {
    let root = project_root()?;
    let man_dir = man()?;
    let binary = root.join("target/release").join(BIN);

    let name = format!("{}-linux-{}", BIN, env::consts::ARCH);
    let stage = root.join("target/dist").join(&name);
    if stage.exists() {
        std::fs::remove_dir_all(&stage)?;
    }
    std::fs::create_dir_all(stage.join("man"))?;

    std::fs::copy(&binary, stage.join(BIN))?;
    for page in MAN_PAGES {
        let from = man_dir.join(page);
        if from.exists() {
            std::fs::copy(&from, stage.join("man").join(page))?;
        }
    }
    for extra in ["README.md", "LICENSE"] {
        let from = root.join(extra);
        if from.exists() {
            std::fs::copy(&from, stage.join(extra))?;
        }
    }

    println!("==> Packaging {}.tar.gz...", name);
    let tarball = format!("{}.tar.gz", name);
    let status = Command::new("tar")
        .args(["czf", tarball.as_str(), name.as_str()])
        .current_dir(root.join("target/dist"))
        .status()?;
    if !status.success() {
        anyhow::bail!("tar failed");
    }

    println!("Created: target/dist/{}.tar.gz", name);
    Ok(())
}
