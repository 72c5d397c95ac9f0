//! Development tasks for roleboot
//!
//! Usage:
//!   cargo xtask install [--root DIR] [--static]  Install release binary into DIR/usr/local/bin
//!   cargo xtask uninstall [--root DIR]           Remove the installed binary
//!   cargo xtask dist [--static]                  Build release binary for container images

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

const MUSL_TARGET: &str = "x86_64-unknown-linux-musl";
const INSTALL_DIR: &str = "usr/local/bin";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        print_help();
        return ExitCode::SUCCESS;
    }

    // Statically linked build for minimal container bases
    let static_build = args.iter().any(|a| a == "--static" || a == "--musl");
    let root = args
        .iter()
        .position(|a| a == "--root")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"));

    let result = match args[0].as_str() {
        "install" => install(&root, static_build),
        "uninstall" => uninstall(&root),
        "dist" => dist(static_build).map(|_| ()),
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
roleboot development tasks

Usage: cargo xtask <COMMAND> [OPTIONS]

Commands:
  install    Build release binary and install to <root>/usr/local/bin
  uninstall  Remove roleboot from <root>/usr/local/bin
  dist       Build optimized release binary for container images

Options:
  --root DIR  Install prefix, e.g. a Docker build stage (default: /)
  --static    Build against {musl} (alias: --musl)

Examples:
  cargo xtask install                       # Install into /usr/local/bin
  cargo xtask install --root ./rootfs       # Stage into an image rootfs
  cargo xtask dist --static                 # Static binary for alpine/scratch
  cargo xtask uninstall                     # Remove installed binary
"#,
        musl = MUSL_TARGET
    );
}

/// Get the project root directory
fn project_root() -> PathBuf {
    let dir = env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .or_else(|_| env::current_dir())
        .unwrap_or_else(|_| PathBuf::from("."));

    // xtask is in a subdirectory, go up one level
    dir.parent().unwrap_or(&dir).to_path_buf()
}

/// Build the release binary and return its path
fn dist(static_build: bool) -> anyhow::Result<PathBuf> {
    let root = project_root();

    if static_build {
        println!("==> Building static release binary ({})...", MUSL_TARGET);
    } else {
        println!("==> Building release binary...");
    }

    let mut args = vec!["build", "--release", "--package", "roleboot"];
    if static_build {
        args.push("--target");
        args.push(MUSL_TARGET);
    }

    let status = Command::new("cargo")
        .args(&args)
        .current_dir(&root)
        .env("ROLEBOOT_GEN_MANPAGES", "1")
        .status()?;

    if !status.success() {
        anyhow::bail!("Build failed");
    }

    let binary = if static_build {
        root.join("target").join(MUSL_TARGET).join("release/roleboot")
    } else {
        root.join("target/release/roleboot")
    };
    if !binary.exists() {
        anyhow::bail!("Binary not found at {:?}", binary);
    }

    println!("==> Built {}", binary.display());
    Ok(binary)
}

/// Installing into / needs root; staging into a rootfs does not
fn installer(root: &Path) -> Command {
    if root == Path::new("/") && !is_root() {
        let mut cmd = Command::new("sudo");
        cmd.arg("install");
        cmd
    } else {
        Command::new("install")
    }
}

fn is_root() -> bool {
    Command::new("id")
        .arg("-u")
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
        .unwrap_or(false)
}

/// Build release binary and install it under `root`
fn install(root: &Path, static_build: bool) -> anyhow::Result<()> {
    let binary = dist(static_build)?;
    let target = root.join(INSTALL_DIR).join("roleboot");

    println!("==> Installing to {}...", target.display());

    let status = installer(root)
        .arg("-Dm755")
        .arg(&binary)
        .arg(&target)
        .status()?;

    if !status.success() {
        anyhow::bail!("Install failed");
    }

    println!("==> Installed successfully!");
    println!();
    println!("Installed: {}", target.display());

    if root == Path::new("/") {
        let _ = Command::new(&target).arg("--version").status();
    }

    Ok(())
}

/// Remove roleboot from `root`
fn uninstall(root: &Path) -> anyhow::Result<()> {
    let target = root.join(INSTALL_DIR).join("roleboot");
    println!("==> Removing {}...", target.display());

    let status = if root == Path::new("/") && !is_root() {
        Command::new("sudo").arg("rm").arg("-f").arg(&target).status()?
    } else {
        Command::new("rm").arg("-f").arg(&target).status()?
    };

    if !status.success() {
        anyhow::bail!("Uninstall failed");
    }

    println!("==> Uninstalled successfully!");
    Ok(())
}
