//! Default command: build, package and publish.

use anyhow::Result;

use crate::cli::Cli;
use crate::commands::{load_configuration, run_options};
use build_clang::core::platform::Platform;
use build_clang::ops::{build_remotely, remote_build_requested, run, RemoteTarget};

pub fn execute(cli: Cli) -> Result<()> {
    let config = load_configuration()?;

    if remote_build_requested(cli.local_build) {
        let target = RemoteTarget::new(
            cli.remote_server.clone().or_else(|| config.remote.server.clone()),
            cli.remote_build_scripts_path
                .clone()
                .or_else(|| config.remote.build_scripts_path.clone()),
        )?;
        let args: Vec<String> = std::env::args().skip(1).collect();
        return build_remotely(&target, &std::env::current_dir()?, &args);
    }

    let platform = Platform::detect();
    tracing::debug!("Detected platform: {:?}", platform);
    let opts = run_options(&cli, &config, &platform)?;
    let summary = run(&opts, &platform, &config)?;

    for (number, elapsed) in &summary.stages_built {
        eprintln!(
            "    Built stage {} in {:.1}s",
            number,
            elapsed.as_secs_f64()
        );
    }
    if let Some(ref release) = summary.release {
        eprintln!("    Archive {}", release.archive.display());
        eprintln!("   Checksum {}", release.checksum.display());
        if summary.published {
            eprintln!("  Published {}", release.tag);
        }
    }
    Ok(())
}
