//! Build script for roleboot
//!
//! Generates man pages from CLI definitions using clap_mangen.

use clap::CommandFactory;
use clap_mangen::Man;
use std::env;
use std::fs::{self, File};
use std::io::Error;
use std::path::PathBuf;

// Include the CLI module
include!("src/cli.rs");

fn main() -> Result<(), Error> {
    // Only generate man pages for release builds or when explicitly requested
    let profile = env::var("PROFILE").unwrap_or_default();
    let generate = env::var("ROLEBOOT_GEN_MANPAGES").is_ok() || profile == "release";

    if !generate {
        return Ok(());
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| "target".to_string()));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = Cli::command();

    // roleboot.1 covers the global flags and the environment table
    let man = Man::new(cmd.clone());
    let mut file = File::create(man_dir.join("roleboot.1"))?;
    man.render(&mut file)?;

    // One page per subcommand (roleboot-run.1, roleboot-plan.1, ...)
    for subcommand in cmd.get_subcommands() {
        let name = subcommand.get_name();
        if name == "help" {
            continue;
        }

        let man = Man::new(subcommand.clone());
        let mut file = File::create(man_dir.join(format!("roleboot-{}.1", name)))?;
        man.render(&mut file)?;
    }

    // Regenerate only when the CLI definitions change
    println!("cargo:rerun-if-changed=src/cli.rs");
    // Surface the output dir so packaging scripts can pick the pages up
    println!(
        "cargo:warning=Man pages generated in: {}",
        man_dir.display()
    );

    Ok(())
}
