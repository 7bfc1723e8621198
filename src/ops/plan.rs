//! `--print_plan`: the stage chain and every stage's derived configuration.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::builder::graph::StageGraph;
use crate::builder::matrix::{derive, InstallPlan, NinjaStep, StageConfig};
use crate::builder::options::CMakeOptions;
use crate::core::build_conf::BuildConf;
use crate::core::platform::Platform;
use crate::core::stage::Stage;

/// The whole run, as planned.
#[derive(Debug, Serialize)]
pub struct BuildPlan<'a> {
    pub tag: String,
    pub llvm_version: &'a str,
    pub build_parent_dir: PathBuf,
    pub final_install_dir: PathBuf,
    pub platform: &'a Platform,
    pub stages: Vec<StagePlan<'a>>,
}

/// One stage and what it will do.
#[derive(Debug, Serialize)]
pub struct StagePlan<'a> {
    #[serde(flatten)]
    pub stage: &'a Stage,
    pub selected: bool,
    pub components: Vec<String>,
    pub target_order: Vec<String>,
    pub steps: Vec<NinjaStep>,
    pub install: InstallPlan,
    pub options: CMakeOptions,
}

impl<'a> StagePlan<'a> {
    fn new(stage: &'a Stage, config: StageConfig, selected: bool) -> Self {
        StagePlan {
            stage,
            selected,
            components: config
                .enabled_components()
                .into_iter()
                .map(str::to_string)
                .collect(),
            target_order: config.target_order().into_iter().map(str::to_string).collect(),
            steps: config.steps,
            install: config.install,
            options: config.options,
        }
    }
}

/// Plan every stage of `graph`, marking the ones inside `[min, max]`.
pub fn build_plan<'a>(
    conf: &'a BuildConf,
    platform: &'a Platform,
    graph: &'a StageGraph,
    window: std::ops::RangeInclusive<usize>,
) -> BuildPlan<'a> {
    let stages = graph
        .stages()
        .iter()
        .map(|stage| {
            let config = derive(stage, conf, platform);
            StagePlan::new(stage, config, window.contains(&stage.number()))
        })
        .collect();
    BuildPlan {
        tag: conf.tag(),
        llvm_version: conf.version().as_str(),
        build_parent_dir: conf.build_parent_dir(),
        final_install_dir: conf.final_install_dir(),
        platform,
        stages,
    }
}

/// Pretty JSON rendering of [`build_plan`].
pub fn render_plan(
    conf: &BuildConf,
    platform: &Platform,
    graph: &StageGraph,
    window: std::ops::RangeInclusive<usize>,
) -> Result<String> {
    let plan = build_plan(conf, platform, graph, window);
    Ok(serde_json::to_string_pretty(&plan)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build_conf::tests::{linux, options};
    use serde_json::Value;

    #[test]
    fn test_plan_json() {
        let mut opts = options("16.0.6-yb-3", std::path::Path::new("/opt/yb-build/llvm"));
        opts.flags.lto = false;
        let platform = linux();
        let conf = BuildConf::new(opts, &platform).unwrap();
        let graph = StageGraph::build(&conf).unwrap();

        let json = render_plan(&conf, &platform, &graph, 2..=3).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let stages = value["stages"].as_array().unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0]["number"], 1);
        assert_eq!(stages[0]["selected"], false);
        assert_eq!(stages[2]["selected"], true);
        assert_eq!(stages[2]["role"], "final_ordinary");
        assert_eq!(
            stages[2]["target_order"],
            serde_json::json!(["cxxabi", "compiler-rt", "cxx", "clang"])
        );
        assert_eq!(stages[2]["options"]["LLVM_BUILD_TESTS"], true);
        assert_eq!(stages[0]["install"]["kind"], "install");
    }
}
