//! Stage configuration matrix.
//!
//! [`derive`] maps a stage, the run configuration and the host platform to
//! everything needed to build that stage: enabled LLVM projects and
//! runtimes, CMake options, the compiler to use, the ninja target sequence
//! and what happens after the build. It does no I/O, so the whole matrix can
//! be checked without running a build.
//!
//! The rules encode bootstrap constraints. Stage 1 is built by a system
//! compiler that may be unable to compile libc++, so no runtimes beyond
//! libunwind are built there. Stage 2 builds libc++, libc++abi and
//! compiler-rt. Stage 3 and later may rely on those libraries being present.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::builder::options::{CMakeOptions, OptionValue};
use crate::core::build_conf::BuildConf;
use crate::core::platform::Platform;
use crate::core::stage::{Stage, StageRole};

/// Major version at which runtimes moved from `LLVM_ENABLE_PROJECTS` to
/// `LLVM_ENABLE_RUNTIMES`, and compiler-rt started depending on libc++abi.
pub const RUNTIMES_LIST_MIN_MAJOR: u64 = 16;

/// Major version from which stage 3+ binaries need an explicit rpath to
/// their own runtime library directory.
pub const RPATH_MIN_MAJOR: u64 = 15;

/// Major version from which stage 3+ binaries also need an rpath to the
/// predecessor's runtime library directory.
pub const PREDECESSOR_RPATH_MIN_MAJOR: u64 = 16;

/// The two binaries an LTO or PGO-final stage rebuilds and replaces.
pub const FINAL_BINARIES: [&str; 2] = ["clang", "lld"];

/// Built after the full build of the final ordinary stage.
pub const FINAL_STAGE_EXTRA_TARGETS: [&str; 2] = ["clangd", "clangd-indexer"];

/// Not installed by `ninja install`; copied by hand.
pub const MANUALLY_INSTALLED_BINARIES: [&str; 1] = ["clangd-indexer"];

/// Snapshotted into the build info directory after the final ordinary stage.
pub const BUILD_METADATA_FILES: [&str; 2] = ["CMakeCache.txt", "compile_commands.json"];

/// Raw profile file pattern written by instrumented binaries.
pub const RAW_PROFILE_PATTERN: &str = "clang-%p-%m.profraw";

/// Where a stage's C and C++ compilers come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompilerSource {
    /// A discovered system compiler. Only the bootstrap stage uses this.
    System,
    /// `bin/clang` and `bin/clang++` under `prefix`.
    Built { prefix: PathBuf },
}

impl CompilerSource {
    /// Paths of the C and C++ compilers, if known without discovery.
    pub fn built_compilers(&self) -> Option<(PathBuf, PathBuf)> {
        match self {
            CompilerSource::System => None,
            CompilerSource::Built { prefix } => Some((
                prefix.join("bin").join("clang"),
                prefix.join("bin").join("clang++"),
            )),
        }
    }
}

/// One ninja invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "targets", rename_all = "snake_case")]
pub enum NinjaStep {
    /// `ninja <targets...>`
    Targets(Vec<String>),
    /// `ninja` with no targets.
    All,
}

impl NinjaStep {
    fn single(target: &str) -> Self {
        NinjaStep::Targets(vec![target.to_string()])
    }

    fn many(targets: &[&str]) -> Self {
        NinjaStep::Targets(targets.iter().map(|t| t.to_string()).collect())
    }
}

/// What happens after the ninja steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallPlan {
    /// `ninja install`, then copy binaries that install skips and snapshot
    /// build metadata files into the build info directory.
    Install {
        copy_binaries: Vec<String>,
        metadata_files: Vec<String>,
    },
    /// Copy only these binaries from the build tree into the final install
    /// directory. Nothing else in the final install is touched.
    ReplaceBinaries { binaries: Vec<String> },
    /// Leave everything in the build tree.
    InPlace,
    /// Merge the raw profiles in `raw_dir` into `output`.
    MergeProfiles { raw_dir: PathBuf, output: PathBuf },
}

/// Everything derived for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageConfig {
    /// `LLVM_ENABLE_PROJECTS`
    pub projects: Vec<String>,
    /// Runtimes built at this stage, wherever they are listed.
    pub runtimes: Vec<String>,
    /// CMake cache options, not including the compilers.
    pub options: CMakeOptions,
    pub compiler: CompilerSource,
    /// Ninja invocations in order.
    pub steps: Vec<NinjaStep>,
    pub install: InstallPlan,
    /// Environment for every external command of the stage.
    pub env: BTreeMap<String, String>,
}

impl StageConfig {
    /// Projects and runtimes together.
    pub fn enabled_components(&self) -> BTreeSet<&str> {
        self.projects
            .iter()
            .chain(self.runtimes.iter())
            .map(String::as_str)
            .collect()
    }

    /// Single targets built one at a time before the full build.
    pub fn target_order(&self) -> Vec<&str> {
        let mut order = Vec::new();
        for step in &self.steps {
            match step {
                NinjaStep::Targets(targets) if targets.len() == 1 => order.push(targets[0].as_str()),
                _ => break,
            }
        }
        order
    }

    /// Files under the final install directory this stage replaces, or
    /// `None` if the stage installs normally.
    pub fn replaced_binaries(&self) -> Option<Vec<PathBuf>> {
        match &self.install {
            InstallPlan::ReplaceBinaries { binaries } => Some(
                binaries
                    .iter()
                    .map(|b| PathBuf::from("bin").join(b))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Derive the complete configuration of `stage`.
pub fn derive(stage: &Stage, conf: &BuildConf, platform: &Platform) -> StageConfig {
    let major = conf.major_version();
    let runtimes = enabled_runtimes(stage, conf);
    let projects = enabled_projects(stage, major, &runtimes, platform);

    let mut options = common_options(stage, &projects);
    options.extend(runtime_list_options(major, &runtimes));
    options.extend(platform_options(platform));
    options.extend(bootstrap_options(stage, conf, platform));
    options.extend(role_options(stage));

    StageConfig {
        projects,
        runtimes,
        options,
        compiler: match stage.compiler_prefix() {
            None => CompilerSource::System,
            Some(prefix) => CompilerSource::Built { prefix },
        },
        steps: ninja_steps(stage, major),
        install: install_plan(stage),
        env: stage_env(stage),
    }
}

fn enabled_runtimes(stage: &Stage, conf: &BuildConf) -> Vec<String> {
    let mut runtimes = vec!["libunwind"];
    if stage.predecessor().is_some() {
        runtimes.extend(["libcxx", "libcxxabi", "compiler-rt"]);
    }
    if stage.role().is_final_ordinary() && conf.flags().openmp {
        runtimes.push("openmp");
    }
    runtimes.into_iter().map(String::from).collect()
}

fn enabled_projects(
    stage: &Stage,
    major: u64,
    runtimes: &[String],
    platform: &Platform,
) -> Vec<String> {
    let mut projects: Vec<String> = vec!["clang".into(), "lld".into()];
    if major < RUNTIMES_LIST_MIN_MAJOR {
        projects.extend(runtimes.iter().cloned());
    }
    if stage.role().is_final_ordinary() {
        projects.push("clang-tools-extra".into());
        // lldb does not build for LLVM 9 and older, nor for 13+ on macOS.
        if major >= 10 && !(major >= 13 && platform.is_macos()) {
            projects.push("lldb".into());
        }
    }
    projects.sort();
    projects
}

fn common_options(stage: &Stage, projects: &[String]) -> CMakeOptions {
    let mut options = CMakeOptions::new();
    options
        .set("LLVM_ENABLE_PROJECTS", OptionValue::list(projects))
        .set(
            "CMAKE_INSTALL_PREFIX",
            stage.install_prefix().display().to_string(),
        )
        .set("CMAKE_BUILD_TYPE", "Release")
        .set("LLVM_TARGETS_TO_BUILD", "X86;AArch64")
        .set("BUILD_SHARED_LIBS", true)
        .set("CMAKE_EXPORT_COMPILE_COMMANDS", true)
        .set("LLVM_ENABLE_RTTI", true)
        .set("LLVM_ENABLE_ZSTD", false);
    options
}

fn runtime_list_options(major: u64, runtimes: &[String]) -> CMakeOptions {
    let mut options = CMakeOptions::new();
    if major >= RUNTIMES_LIST_MIN_MAJOR {
        options.set("LLVM_ENABLE_RUNTIMES", OptionValue::list(runtimes));
    }
    options
}

fn platform_options(platform: &Platform) -> CMakeOptions {
    let mut options = CMakeOptions::new();
    if platform.is_macos() {
        options
            .set("COMPILER_RT_ENABLE_IOS", false)
            .set("COMPILER_RT_ENABLE_WATCHOS", false)
            .set("COMPILER_RT_ENABLE_TVOS", false);
    }
    options
}

/// Options that depend on which runtime libraries earlier stages produced.
fn bootstrap_options(stage: &Stage, conf: &BuildConf, platform: &Platform) -> CMakeOptions {
    let mut options = CMakeOptions::new();
    let number = stage.number();
    let major = conf.major_version();
    let use_compiler_rt = conf.flags().use_compiler_rt;

    let Some(predecessor) = stage.predecessor() else {
        return options;
    };

    options
        .set("CLANG_DEFAULT_CXX_STDLIB", "libc++")
        .set("LIBCXXABI_USE_LLVM_UNWINDER", true);

    let mut linker_flags: Vec<String> = Vec::new();
    if platform.is_linux() {
        if use_compiler_rt {
            // Keeps libgcc.a out so that _Unwind_Resume resolves to libgcc_s.
            linker_flags.push("-Wl,--exclude-libs,libgcc.a".into());
        }
        options.set("LLVM_ENABLE_LLD", true);
    }

    if number >= 3 && is_amzn2_aarch64(platform) {
        // The UBSAN runtime fails to link on this combination otherwise.
        linker_flags.push("-lc++".into());
    }

    if number >= 3 && platform.is_linux() && major >= RPATH_MIN_MAJOR {
        let lib_dir = platform.os_specific_lib_dir();
        // `$` is escaped so that LLVM's CMake scripts keep $ORIGIN literal.
        linker_flags.push(rpath_flag(&format!("\\$ORIGIN/../{}", lib_dir)));
        if major >= PREDECESSOR_RPATH_MIN_MAJOR {
            let pred_lib_dir = predecessor.runtime_prefix.join(&lib_dir);
            linker_flags.push(rpath_flag(&pred_lib_dir.display().to_string()));
        }
    }

    let linker_flags = linker_flags.join(" ");
    for var in [
        "CMAKE_SHARED_LINKER_FLAGS_INIT",
        "CMAKE_MODULE_LINKER_FLAGS_INIT",
        "CMAKE_EXE_LINKER_FLAGS_INIT",
    ] {
        options.set(var, linker_flags.as_str());
    }

    if number >= 3 && platform.is_linux() && major >= RUNTIMES_LIST_MIN_MAJOR {
        options
            .set("SANITIZER_COMMON_LINK_FLAGS", OptionValue::list(["-lc++abi", "-lunwind"]))
            .set("SANITIZER_TEST_CXX_LIBRARIES", "-lunwind");
    }

    if number >= 3 {
        if use_compiler_rt {
            options
                .set("LIBCXXABI_USE_COMPILER_RT", true)
                .set("LIBUNWIND_USE_COMPILER_RT", true)
                .set("LIBCXX_USE_COMPILER_RT", true);
        }
        options
            .set("SANITIZER_ALLOW_CXXABI", true)
            .set("SANITIZER_CXX_ABI", "libc++")
            .set("LLVM_ENABLE_LIBCXX", true)
            .set("CLANG_DEFAULT_RTLIB", "compiler-rt");
    }

    options
}

fn role_options(stage: &Stage) -> CMakeOptions {
    let mut options = CMakeOptions::new();
    match stage.role() {
        StageRole::Ordinary => {}
        StageRole::FinalOrdinary => {
            // Needed to build clangd-indexer; the tests themselves are not run.
            if stage.predecessor().is_some() {
                options.set("LLVM_BUILD_TESTS", true);
            }
        }
        StageRole::Lto => {
            options.extend(lto_options());
        }
        StageRole::PgoInstrumented => {
            options
                .set("LLVM_BUILD_INSTRUMENTED", "IR")
                .set("LLVM_BUILD_RUNTIME", false)
                .set("BUILD_SHARED_LIBS", false);
        }
        StageRole::PgoTraining => {}
        StageRole::PgoFinal => {
            options.extend(lto_options());
            if let Some(pred) = stage.predecessor() {
                options.set("LLVM_PROFDATA_FILE", pred.profdata_path().display().to_string());
            }
        }
    }
    options
}

fn lto_options() -> CMakeOptions {
    let mut options = CMakeOptions::new();
    options
        .set("LLVM_ENABLE_LTO", "Full")
        .set("BUILD_SHARED_LIBS", false);
    options
}

/// Runtime targets in dependency order. From LLVM 16 compiler-rt depends on
/// libc++abi, so building it first fails to link.
pub fn runtime_target_order(major: u64) -> [&'static str; 3] {
    if major >= RUNTIMES_LIST_MIN_MAJOR {
        ["cxxabi", "compiler-rt", "cxx"]
    } else {
        ["compiler-rt", "cxxabi", "cxx"]
    }
}

fn ninja_steps(stage: &Stage, major: u64) -> Vec<NinjaStep> {
    match stage.role() {
        StageRole::Ordinary | StageRole::FinalOrdinary => {
            let mut steps = Vec::new();
            if stage.predecessor().is_some() {
                steps.extend(runtime_target_order(major).iter().map(|t| NinjaStep::single(t)));
            }
            steps.push(NinjaStep::single("clang"));
            steps.push(NinjaStep::All);
            if stage.role().is_final_ordinary() {
                steps.extend(FINAL_STAGE_EXTRA_TARGETS.iter().map(|t| NinjaStep::single(t)));
            }
            steps
        }
        StageRole::Lto | StageRole::PgoInstrumented | StageRole::PgoFinal => {
            vec![NinjaStep::many(&FINAL_BINARIES)]
        }
        StageRole::PgoTraining => vec![NinjaStep::single("clang")],
    }
}

fn install_plan(stage: &Stage) -> InstallPlan {
    match stage.role() {
        StageRole::Ordinary => InstallPlan::Install {
            copy_binaries: Vec::new(),
            metadata_files: Vec::new(),
        },
        StageRole::FinalOrdinary => InstallPlan::Install {
            copy_binaries: MANUALLY_INSTALLED_BINARIES.iter().map(|s| s.to_string()).collect(),
            metadata_files: BUILD_METADATA_FILES.iter().map(|s| s.to_string()).collect(),
        },
        StageRole::Lto | StageRole::PgoFinal => InstallPlan::ReplaceBinaries {
            binaries: FINAL_BINARIES.iter().map(|s| s.to_string()).collect(),
        },
        StageRole::PgoInstrumented => InstallPlan::InPlace,
        StageRole::PgoTraining => InstallPlan::MergeProfiles {
            raw_dir: stage.profiles_dir(),
            output: stage.profdata_path(),
        },
    }
}

fn stage_env(stage: &Stage) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    if stage.role() == StageRole::PgoTraining {
        env.insert(
            "LLVM_PROFILE_FILE".to_string(),
            stage
                .profiles_dir()
                .join(RAW_PROFILE_PATTERN)
                .display()
                .to_string(),
        );
    }
    env
}

fn rpath_flag(path: &str) -> String {
    format!("-Wl,-rpath={}", path)
}

fn is_amzn2_aarch64(platform: &Platform) -> bool {
    platform.is_linux() && platform.short_os_name_and_version == "amzn2" && platform.arch == "aarch64"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::graph::StageGraph;
    use crate::core::build_conf::tests::options;
    use crate::core::build_conf::BuildFlags;
    use crate::core::platform::Os;
    use std::path::Path;

    fn conf_with(version: &str, flags: BuildFlags) -> BuildConf {
        let mut opts = options(version, Path::new("/opt/yb-build/llvm"));
        opts.skip_auto_suffix = true;
        opts.flags = flags;
        BuildConf::new(opts, &linux()).unwrap()
    }

    fn conf(version: &str) -> BuildConf {
        conf_with(version, BuildFlags::default())
    }

    fn linux() -> Platform {
        Platform::new(Os::Linux, "ubuntu22.04", "x86_64")
    }

    fn macos() -> Platform {
        Platform::new(Os::MacOs, "macos14", "arm64")
    }

    fn derive_all(conf: &BuildConf, platform: &Platform) -> Vec<(Stage, StageConfig)> {
        let graph = StageGraph::build(conf).unwrap();
        graph
            .stages()
            .iter()
            .map(|s| (s.clone(), derive(s, conf, platform)))
            .collect()
    }

    fn all_flag_combinations() -> Vec<BuildFlags> {
        let mut out = Vec::new();
        for lto in [false, true] {
            for pgo in [false, true] {
                if pgo && !lto {
                    continue;
                }
                for use_compiler_rt in [false, true] {
                    for openmp in [false, true] {
                        out.push(BuildFlags {
                            lto,
                            pgo,
                            use_compiler_rt,
                            openmp,
                            ..BuildFlags::default()
                        });
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_stage1_never_builds_runtime_libraries() {
        for version in ["12.0.1", "15.0.7-yb-1", "16.0.6-yb-3", "18.1.8-yb-1"] {
            for flags in all_flag_combinations() {
                for platform in [linux(), macos()] {
                    let conf = conf_with(version, flags);
                    let stages = derive_all(&conf, &platform);
                    let (_, cfg) = &stages[0];
                    let components = cfg.enabled_components();
                    assert!(!components.contains("compiler-rt"));
                    assert!(!components.contains("libcxx"));
                    assert!(!components.contains("libcxxabi"));
                    assert!(components.contains("clang"));
                    assert!(components.contains("lld"));
                    assert!(components.contains("libunwind"));
                    assert!(!cfg.options.contains("CLANG_DEFAULT_CXX_STDLIB"));
                    assert_eq!(cfg.compiler, CompilerSource::System);
                    assert_eq!(cfg.target_order(), vec!["clang"]);
                }
            }
        }
    }

    #[test]
    fn test_cxxabi_details_iff_stage_three_or_later() {
        for flags in all_flag_combinations() {
            for platform in [linux(), macos()] {
                let conf = conf_with("16.0.6-yb-3", flags);
                for (stage, cfg) in derive_all(&conf, &platform) {
                    assert_eq!(
                        cfg.options.get_bool("SANITIZER_ALLOW_CXXABI") == Some(true),
                        stage.number() >= 3,
                        "stage {}",
                        stage.number()
                    );
                    assert_eq!(
                        cfg.options.get_str("CLANG_DEFAULT_RTLIB") == Some("compiler-rt"),
                        stage.number() >= 3
                    );
                }
            }
        }
    }

    #[test]
    fn test_stage2_uses_new_stdlib_and_unwinder() {
        let conf = conf("16.0.6-yb-3");
        let stages = derive_all(&conf, &linux());
        let (stage, cfg) = &stages[1];
        assert_eq!(stage.number(), 2);
        assert_eq!(cfg.options.get_str("CLANG_DEFAULT_CXX_STDLIB"), Some("libc++"));
        assert_eq!(cfg.options.get_bool("LIBCXXABI_USE_LLVM_UNWINDER"), Some(true));
        assert_eq!(cfg.options.get_bool("LLVM_ENABLE_LLD"), Some(true));
        assert_eq!(
            cfg.options.get_str("CMAKE_EXE_LINKER_FLAGS_INIT"),
            Some("-Wl,--exclude-libs,libgcc.a")
        );
        assert!(!cfg.options.contains("LIBCXX_USE_COMPILER_RT"));
        assert_eq!(
            cfg.compiler,
            CompilerSource::Built {
                prefix: PathBuf::from(
                    "/opt/yb-build/llvm/yb-llvm-v16.0.6-yb-3-build/stage-1/installed"
                )
            }
        );
    }

    #[test]
    fn test_target_order_depends_on_version() {
        let new = conf("16.0.6-yb-3");
        let (_, cfg) = &derive_all(&new, &linux())[1];
        assert_eq!(cfg.target_order(), vec!["cxxabi", "compiler-rt", "cxx", "clang"]);

        let old = conf("15.0.7-yb-1");
        let (_, cfg) = &derive_all(&old, &linux())[1];
        assert_eq!(cfg.target_order(), vec!["compiler-rt", "cxxabi", "cxx", "clang"]);
    }

    #[test]
    fn test_runtimes_list_mechanism_is_exclusive() {
        let old = conf("15.0.7-yb-1");
        let (_, cfg) = &derive_all(&old, &linux())[1];
        assert!(!cfg.options.contains("LLVM_ENABLE_RUNTIMES"));
        assert!(cfg.projects.contains(&"libcxx".to_string()));

        let new = conf("16.0.6-yb-3");
        let (_, cfg) = &derive_all(&new, &linux())[1];
        assert_eq!(
            cfg.options.get_str("LLVM_ENABLE_RUNTIMES"),
            Some("libunwind;libcxx;libcxxabi;compiler-rt")
        );
        assert_eq!(cfg.options.get_str("LLVM_ENABLE_PROJECTS"), Some("clang;lld"));
    }

    #[test]
    fn test_final_stage_tooling() {
        let conf = conf("18.1.8-yb-1");
        let (stage, cfg) = &derive_all(&conf, &linux())[2];
        assert_eq!(stage.role(), StageRole::FinalOrdinary);
        assert_eq!(
            cfg.options.get_str("LLVM_ENABLE_PROJECTS"),
            Some("clang;clang-tools-extra;lld;lldb")
        );
        assert!(cfg.runtimes.contains(&"openmp".to_string()));
        assert_eq!(cfg.options.get_bool("LLVM_BUILD_TESTS"), Some(true));
        assert_eq!(
            cfg.steps[cfg.steps.len() - 2..],
            [NinjaStep::single("clangd"), NinjaStep::single("clangd-indexer")]
        );
        assert_eq!(
            cfg.install,
            InstallPlan::Install {
                copy_binaries: vec!["clangd-indexer".into()],
                metadata_files: vec!["CMakeCache.txt".into(), "compile_commands.json".into()],
            }
        );
        assert_eq!(
            cfg.options.get_str("CMAKE_INSTALL_PREFIX"),
            Some("/opt/yb-build/llvm/yb-llvm-v18.1.8-yb-1")
        );
    }

    #[test]
    fn test_lldb_gating() {
        let (_, cfg) = &derive_all(&conf("18.1.8-yb-1"), &macos())[2];
        assert!(!cfg.projects.contains(&"lldb".to_string()));
        assert_eq!(cfg.options.get_bool("COMPILER_RT_ENABLE_IOS"), Some(false));

        let (_, cfg) = &derive_all(&conf("12.0.1"), &macos())[2];
        assert!(cfg.projects.contains(&"lldb".to_string()));
    }

    #[test]
    fn test_openmp_only_when_enabled() {
        let flags = BuildFlags {
            openmp: false,
            ..BuildFlags::default()
        };
        let (_, cfg) = &derive_all(&conf_with("18.1.8-yb-1", flags), &linux())[2];
        assert!(!cfg.runtimes.contains(&"openmp".to_string()));
    }

    #[test]
    fn test_rpath_injection() {
        let conf16 = conf("16.0.6-yb-3");
        let stages = derive_all(&conf16, &linux());
        let (_, cfg) = &stages[2];
        let flags = cfg.options.get_str("CMAKE_SHARED_LINKER_FLAGS_INIT").unwrap();
        assert_eq!(
            flags,
            "-Wl,--exclude-libs,libgcc.a \
             -Wl,-rpath=\\$ORIGIN/../lib/x86_64-unknown-linux-gnu \
             -Wl,-rpath=/opt/yb-build/llvm/yb-llvm-v16.0.6-yb-3-build/stage-2/installed/lib/x86_64-unknown-linux-gnu"
        );
        assert_eq!(
            cfg.options.get_str("SANITIZER_COMMON_LINK_FLAGS"),
            Some("-lc++abi;-lunwind")
        );

        let conf15 = conf("15.0.7-yb-1");
        let (_, cfg) = &derive_all(&conf15, &linux())[2];
        let flags = cfg.options.get_str("CMAKE_SHARED_LINKER_FLAGS_INIT").unwrap();
        assert!(flags.contains("\\$ORIGIN"));
        assert!(!flags.contains("stage-2"));
        assert!(!cfg.options.contains("SANITIZER_COMMON_LINK_FLAGS"));

        let conf14 = conf("14.0.6-yb-2");
        let (_, cfg) = &derive_all(&conf14, &linux())[2];
        assert!(!cfg
            .options
            .get_str("CMAKE_SHARED_LINKER_FLAGS_INIT")
            .unwrap()
            .contains("rpath"));
    }

    #[test]
    fn test_amzn2_aarch64_special_case() {
        let platform = Platform::new(Os::Linux, "amzn2", "aarch64");
        let conf = conf("16.0.6-yb-3");
        let stages = derive_all(&conf, &platform);
        let stage2 = stages[1].1.options.get_str("CMAKE_EXE_LINKER_FLAGS_INIT").unwrap();
        let stage3 = stages[2].1.options.get_str("CMAKE_EXE_LINKER_FLAGS_INIT").unwrap();
        assert!(!stage2.contains("-lc++"));
        assert!(stage3.contains("-lc++"));

        let other = Platform::new(Os::Linux, "amzn2", "x86_64");
        let stages = derive_all(&conf, &other);
        let stage3 = stages[2].1.options.get_str("CMAKE_EXE_LINKER_FLAGS_INIT").unwrap();
        assert!(!stage3.contains("-lc++"));
    }

    #[test]
    fn test_no_compiler_rt() {
        let flags = BuildFlags {
            use_compiler_rt: false,
            ..BuildFlags::default()
        };
        let conf = conf_with("16.0.6-yb-3", flags);
        let (_, cfg) = &derive_all(&conf, &linux())[2];
        assert!(!cfg.options.contains("LIBCXX_USE_COMPILER_RT"));
        assert!(!cfg
            .options
            .get_str("CMAKE_EXE_LINKER_FLAGS_INIT")
            .unwrap()
            .contains("libgcc.a"));
    }

    #[test]
    fn test_macos_has_no_linux_linker_flags() {
        let conf = conf("16.0.6-yb-3");
        for (stage, cfg) in derive_all(&conf, &macos()).iter().skip(1) {
            assert!(!cfg.options.contains("LLVM_ENABLE_LLD"), "stage {}", stage.number());
            assert_eq!(cfg.options.get_str("CMAKE_EXE_LINKER_FLAGS_INIT"), Some(""));
        }
    }

    #[test]
    fn test_lto_stage_replaces_only_two_binaries() {
        let flags = BuildFlags {
            lto: true,
            pgo: false,
            ..BuildFlags::default()
        };
        let conf = conf_with("16.0.6-yb-3", flags);
        let stages = derive_all(&conf, &linux());
        assert_eq!(stages.len(), 4);
        let (stage, cfg) = &stages[3];
        assert_eq!(stage.role(), StageRole::Lto);
        assert_eq!(
            cfg.replaced_binaries(),
            Some(vec![PathBuf::from("bin/clang"), PathBuf::from("bin/lld")])
        );
        assert_eq!(cfg.steps, vec![NinjaStep::many(&["clang", "lld"])]);
        assert_eq!(cfg.options.get_str("LLVM_ENABLE_LTO"), Some("Full"));
        assert_eq!(cfg.options.get_bool("BUILD_SHARED_LIBS"), Some(false));
        assert!(!cfg.projects.contains(&"clang-tools-extra".to_string()));
        assert!(!cfg.options.contains("LLVM_BUILD_TESTS"));
        assert_eq!(
            cfg.compiler,
            CompilerSource::Built {
                prefix: PathBuf::from("/opt/yb-build/llvm/yb-llvm-v16.0.6-yb-3")
            }
        );
    }

    #[test]
    fn test_pgo_stages() {
        let flags = BuildFlags {
            lto: true,
            pgo: true,
            ..BuildFlags::default()
        };
        let conf = conf_with("18.1.8-yb-1", flags);
        let stages = derive_all(&conf, &linux());
        assert_eq!(stages.len(), 7);

        let (_, instrumented) = &stages[4];
        assert_eq!(instrumented.options.get_str("LLVM_BUILD_INSTRUMENTED"), Some("IR"));
        assert_eq!(instrumented.options.get_bool("LLVM_BUILD_RUNTIME"), Some(false));
        assert!(!instrumented.options.contains("LLVM_ENABLE_LTO"));
        assert_eq!(instrumented.install, InstallPlan::InPlace);

        let (training_stage, training) = &stages[5];
        assert_eq!(
            training.compiler,
            CompilerSource::Built {
                prefix: PathBuf::from("/opt/yb-build/llvm/yb-llvm-v18.1.8-yb-1-build/stage-5/build")
            }
        );
        assert!(training.env["LLVM_PROFILE_FILE"].ends_with("stage-6/profiles/clang-%p-%m.profraw"));
        assert_eq!(
            training.install,
            InstallPlan::MergeProfiles {
                raw_dir: training_stage.profiles_dir(),
                output: training_stage.profdata_path(),
            }
        );

        let (_, pgo_final) = &stages[6];
        assert_eq!(pgo_final.options.get_str("LLVM_ENABLE_LTO"), Some("Full"));
        assert_eq!(
            pgo_final.options.get_str("LLVM_PROFDATA_FILE"),
            Some("/opt/yb-build/llvm/yb-llvm-v18.1.8-yb-1-build/stage-6/profiles/clang.profdata")
        );
        assert!(pgo_final.replaced_binaries().is_some());
    }

    #[test]
    fn test_derive_is_idempotent() {
        let conf = conf("16.0.6-yb-3");
        let first = derive_all(&conf, &linux());
        let second = derive_all(&conf, &linux());
        assert_eq!(first, second);
    }

    #[test]
    fn test_only_final_stage_uses_final_prefix() {
        let flags = BuildFlags {
            lto: false,
            pgo: false,
            ..BuildFlags::default()
        };
        let conf = conf_with("16.0.6-yb-3", flags);
        let final_dir = conf.final_install_dir().display().to_string();
        let stages = derive_all(&conf, &linux());
        assert_eq!(stages.len(), 3);
        for (stage, cfg) in &stages {
            assert_eq!(
                cfg.options.get_str("CMAKE_INSTALL_PREFIX") == Some(final_dir.as_str()),
                stage.number() == 3
            );
        }
    }

    #[test]
    fn test_cmake_args_are_rendered() {
        let conf = conf("16.0.6-yb-3");
        let (_, cfg) = &derive_all(&conf, &linux())[0];
        let args = cfg.options.to_cmake_args();
        assert!(args.contains(&"-DCMAKE_BUILD_TYPE=Release".to_string()));
        assert!(args.contains(&"-DLLVM_ENABLE_ZSTD=OFF".to_string()));
        assert!(args.contains(&"-DBUILD_SHARED_LIBS=ON".to_string()));
        assert!(args.contains(&"-DLLVM_TARGETS_TO_BUILD=X86;AArch64".to_string()));
    }
}
