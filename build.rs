//! Build script for the `pgscout` manual pages.
//!
//! `pgscout.1` covers the global options. Every subcommand also gets its own
//! `pgscout-<name>.1`, since the scope and dump flags only make sense next to
//! the subcommand that takes them. Pages land in the build output directory.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;

    let root = Cli::command();
    render_page(&root, &out_dir.join("pgscout.1"))?;
    for subcommand in root.get_subcommands() {
        let name = format!("pgscout-{}", subcommand.get_name());
        let page = subcommand.clone().name(name.clone());
        render_page(&page, &out_dir.join(format!("{name}.1")))?;
    }
    Ok(())
}

fn render_page(command: &Command, path: &Path) -> io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command.clone()).render(&mut buffer)?;
    fs::write(path, buffer)
}
