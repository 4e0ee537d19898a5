//! Build script for dictkey
//!
//! Generates man pages from CLI definitions using clap_mangen.

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs::{self, File};
use std::io::Error;
use std::path::PathBuf;

include!("src/cli.rs");

fn main() -> Result<(), Error> {
    // Only generate man pages for release builds or when explicitly requested
    let profile = env::var("PROFILE").unwrap_or_default();
    let generate = env::var("DICTKEY_GEN_MANPAGES").is_ok() || profile == "release";

    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=DICTKEY_GEN_MANPAGES");

    if !generate {
        return Ok(());
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| "target".to_string()));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = Cli::command();

    let mut file = File::create(man_dir.join("dictkey.1"))?;
    Man::new(cmd.clone()).render(&mut file)?;

    // One page per subcommand (dictkey-capture.1, dictkey-detect.1, ...)
    for subcommand in cmd.get_subcommands() {
        let name = subcommand.get_name();
        if name == "help" {
            continue;
        }

        let mut file = File::create(man_dir.join(format!("dictkey-{}.1", name)))?;
        Man::new(subcommand.clone()).render(&mut file)?;
    }

    println!(
        "cargo:warning=Man pages generated in: {}",
        man_dir.display()
    );

    Ok(())
}
