//! The top-level pipeline.
//!
//! checkout → bind identity → build stages in the selected window →
//! package → publish. Each step aborts the run on failure and leaves the
//! workspace as it is so the run can be resumed.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::builder::compilers::activate_devtoolset;
use crate::builder::executor::StageExecutor;
use crate::builder::graph::StageGraph;
use crate::builder::tools::BuildTools;
use crate::core::build_conf::{BuildConf, BuildConfOptions};
use crate::core::platform::Platform;
use crate::ops::package::{package, PackageOptions, PackagedRelease};
use crate::ops::release::{publish, ReleaseOptions};
use crate::ops::source::{checkout_source, head_revision, write_revision_log};
use crate::util::config::Config;
use crate::util::fs::ensure_dir;

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub conf: BuildConfOptions,

    /// First stage to build
    pub min_stage: usize,

    /// Last stage to build (defaults to the last stage)
    pub max_stage: Option<usize>,

    /// Do not check out or build anything
    pub skip_build: bool,

    /// Package but do not publish
    pub skip_upload: bool,

    /// Package and publish this existing install directory instead of building
    pub upload_earlier_build: Option<PathBuf>,

    /// Reuse an existing archive
    pub reuse_tarball: bool,

    /// `owner/name` of the repository receiving the release
    pub release_repo: Option<String>,
}

/// A validated run: configuration, stage chain and the stages to build.
#[derive(Debug)]
pub struct PreparedRun {
    pub conf: BuildConf,
    pub graph: StageGraph,
    /// `None` when building is skipped.
    pub window: Option<RangeInclusive<usize>>,
}

/// What a completed run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub stages_built: Vec<(usize, Duration)>,
    pub release: Option<PackagedRelease>,
    pub published: bool,
}

/// Check every input that can be checked without external work.
pub fn prepare(opts: &RunOptions, platform: &Platform) -> Result<PreparedRun> {
    let conf = BuildConf::new(opts.conf.clone(), platform)?;
    conf.check_existing_build_dir()?;
    let graph = StageGraph::build(&conf)?;
    let window = if opts.skip_build {
        None
    } else {
        Some(graph.window(opts.min_stage, opts.max_stage, &conf)?)
    };
    Ok(PreparedRun {
        conf,
        graph,
        window,
    })
}

/// Run the whole pipeline.
pub fn run(opts: &RunOptions, platform: &Platform, config: &Config) -> Result<RunSummary> {
    if let Some(ref install_dir) = opts.upload_earlier_build {
        return package_and_publish(install_dir, opts, platform);
    }

    let PreparedRun { mut conf, window, .. } = prepare(opts, platform)?;
    let mut summary = RunSummary::default();

    match window {
        None => tracing::info!("Skipping build"),
        Some(window) => {
            // Held until every stage has been built.
            let _devtoolset = activate_devtoolset(platform)?;
            let tools = BuildTools::discover(config)?;
            prepare_source(&mut conf, &tools)?;

            // Paths change when the identity is bound.
            let graph = StageGraph::build(&conf)?;
            tracing::info!(
                "After all stages, LLVM will be built and installed to: {}",
                conf.final_install_dir().display()
            );

            let executor = StageExecutor::new(&conf, platform, &tools);
            for stage in graph.stages() {
                if !window.contains(&stage.number()) {
                    tracing::info!("Skipping stage {}", stage.number());
                    continue;
                }
                let elapsed = executor.build(stage)?;
                summary.stages_built.push((stage.number(), elapsed));
            }
        }
    }

    let final_install_dir = conf.final_install_dir();
    if !final_install_dir.exists() {
        tracing::info!(
            "Final install directory {} does not exist, nothing to package",
            final_install_dir.display()
        );
        return Ok(summary);
    }
    let packaged = package_and_publish(&final_install_dir, opts, platform)?;
    summary.release = packaged.release;
    summary.published = packaged.published;
    Ok(summary)
}

/// Check out the source, bind the identity and record the revision.
fn prepare_source(conf: &mut BuildConf, tools: &BuildTools) -> Result<()> {
    if conf.existing_build_dir().is_some() {
        tracing::info!("Not cloning the code, assuming it has already been done");
    } else {
        checkout_source(conf, tools)?;
    }

    if conf.identity().needs_resolution() {
        let revision = head_revision(&conf.llvm_project_clone_dir())?;
        conf.resolve_revision(&revision)
            .context("failed to bind the build identity")?;
        tracing::info!(
            "Final LLVM code directory: {}",
            conf.llvm_project_clone_dir().display()
        );
    }

    let build_info_dir = conf.build_info_dir();
    ensure_dir(&build_info_dir)?;
    write_revision_log(&conf.llvm_project_clone_dir(), &build_info_dir)?;
    Ok(())
}

fn package_and_publish(install_dir: &Path, opts: &RunOptions, platform: &Platform) -> Result<RunSummary> {
    let release = package(
        install_dir,
        &opts.conf.version,
        platform,
        &PackageOptions {
            reuse_tarball: opts.reuse_tarball,
        },
    )?;

    let published = if opts.skip_upload {
        tracing::info!("Skipping upload");
        false
    } else {
        let release_opts = ReleaseOptions {
            repo: opts.release_repo.clone(),
            lto: opts.conf.flags.lto,
            cwd: install_dir.parent().map(Path::to_path_buf),
        };
        publish(&release, &release_opts)?;
        true
    };

    Ok(RunSummary {
        stages_built: Vec::new(),
        release: Some(release),
        published,
    })
}
