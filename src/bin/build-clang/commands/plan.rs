//! `--print_plan`: show what a run would build without doing it.

use anyhow::Result;

use crate::cli::Cli;
use crate::commands::{load_configuration, run_options};
use build_clang::core::platform::Platform;
use build_clang::ops::{prepare, render_plan};

pub fn execute(cli: Cli) -> Result<()> {
    let config = load_configuration()?;
    let platform = Platform::detect();
    let opts = run_options(&cli, &config, &platform)?;
    let prepared = prepare(&opts, &platform)?;

    // Nothing is selected when building is skipped.
    let window = prepared.window.unwrap_or(1..=0);
    let json = render_plan(&prepared.conf, &platform, &prepared.graph, window)?;
    println!("{}", json);
    Ok(())
}
