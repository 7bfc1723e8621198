//! Stage descriptors.
//!
//! A stage is one full build of the toolchain with one compiler and one
//! option set. Stages are created by the graph builder and never mutated.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Directory name of a stage under the build parent directory.
pub const STAGE_DIR_PREFIX: &str = "stage-";

/// What a stage is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// A bootstrap or intermediate stage that installs into its own prefix.
    Ordinary,
    /// The last ordinary stage. Installs into the final install directory.
    FinalOrdinary,
    /// Static, fully link-time optimized rebuild of clang and lld.
    Lto,
    /// IR-instrumented build of clang and lld, used only to collect a profile.
    PgoInstrumented,
    /// Training run: builds clang with the instrumented compiler and merges
    /// the raw profiles it writes.
    PgoTraining,
    /// Link-time and profile-guided optimized rebuild of clang and lld.
    PgoFinal,
}

impl StageRole {
    /// Short lowercase name used in logs and plans.
    pub fn name(self) -> &'static str {
        match self {
            StageRole::Ordinary => "ordinary",
            StageRole::FinalOrdinary => "final",
            StageRole::Lto => "lto",
            StageRole::PgoInstrumented => "pgo-instrumented",
            StageRole::PgoTraining => "pgo-training",
            StageRole::PgoFinal => "pgo-final",
        }
    }

    pub fn is_final_ordinary(self) -> bool {
        self == StageRole::FinalOrdinary
    }

    pub fn is_lto(self) -> bool {
        self == StageRole::Lto
    }

    pub fn is_pgo_instrumentation(self) -> bool {
        self == StageRole::PgoInstrumented
    }

    pub fn is_pgo_final(self) -> bool {
        self == StageRole::PgoFinal
    }

    /// Whether this stage belongs to the PGO extension of the chain.
    pub fn is_pgo(self) -> bool {
        matches!(
            self,
            StageRole::PgoInstrumented | StageRole::PgoTraining | StageRole::PgoFinal
        )
    }

    /// Whether the stage installs with `ninja install`.
    pub fn installs(self) -> bool {
        matches!(self, StageRole::Ordinary | StageRole::FinalOrdinary)
    }

    /// Whether the stage rebuilds clang and lld and copies them over the
    /// final install instead of installing.
    pub fn replaces_final_binaries(self) -> bool {
        matches!(self, StageRole::Lto | StageRole::PgoFinal)
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of the merged profile inside a stage's profiles directory.
pub const PROFDATA_FILE_NAME: &str = "clang.profdata";

/// Non-owning link to the previous stage in the chain.
///
/// Carries copies of the predecessor's paths so that a stage can be handed
/// to the configuration matrix on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredecessorLink {
    pub number: usize,
    pub role: StageRole,
    pub stage_base_dir: PathBuf,
    pub install_prefix: PathBuf,
    pub runtime_prefix: PathBuf,
}

impl PredecessorLink {
    pub fn build_dir(&self) -> PathBuf {
        self.stage_base_dir.join("build")
    }

    /// Merged profile, if the predecessor is a training stage.
    pub fn profdata_path(&self) -> PathBuf {
        self.stage_base_dir.join("profiles").join(PROFDATA_FILE_NAME)
    }
}

/// One stage of the bootstrap chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    number: usize,
    role: StageRole,
    predecessor: Option<PredecessorLink>,
    stage_base_dir: PathBuf,
    install_prefix: PathBuf,
    final_install_dir: PathBuf,
}

impl Stage {
    /// Create a stage rooted at `<build_parent>/stage-<number>`.
    pub fn new(
        number: usize,
        role: StageRole,
        predecessor: Option<PredecessorLink>,
        build_parent_dir: &Path,
        final_install_dir: &Path,
    ) -> Self {
        let stage_base_dir = build_parent_dir.join(format!("{}{}", STAGE_DIR_PREFIX, number));
        let install_prefix = match role {
            StageRole::FinalOrdinary | StageRole::Lto | StageRole::PgoFinal => {
                final_install_dir.to_path_buf()
            }
            _ => stage_base_dir.join("installed"),
        };
        Stage {
            number,
            role,
            predecessor,
            stage_base_dir,
            install_prefix,
            final_install_dir: final_install_dir.to_path_buf(),
        }
    }

    /// 1-based position in the chain.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn role(&self) -> StageRole {
        self.role
    }

    pub fn predecessor(&self) -> Option<&PredecessorLink> {
        self.predecessor.as_ref()
    }

    /// `<build_parent>/stage-<n>`
    pub fn stage_base_dir(&self) -> &Path {
        &self.stage_base_dir
    }

    /// Where CMake configures and ninja builds.
    pub fn build_dir(&self) -> PathBuf {
        self.stage_base_dir.join("build")
    }

    /// `CMAKE_INSTALL_PREFIX` of this stage.
    ///
    /// Only the final ordinary stage installs into the final install
    /// directory. LTO and PGO-final stages point here too because they copy
    /// their binaries into it.
    pub fn install_prefix(&self) -> &Path {
        &self.install_prefix
    }

    pub fn final_install_dir(&self) -> &Path {
        &self.final_install_dir
    }

    /// Per-run directory for compiler wrapper invocation records.
    pub fn compiler_invocations_dir(&self, timestamp: &str) -> PathBuf {
        self.stage_base_dir
            .join("compiler_invocations")
            .join(timestamp)
    }

    /// Where the training stage writes raw and merged profiles.
    pub fn profiles_dir(&self) -> PathBuf {
        self.stage_base_dir.join("profiles")
    }

    /// Merged profile written by the training stage.
    pub fn profdata_path(&self) -> PathBuf {
        self.profiles_dir().join(PROFDATA_FILE_NAME)
    }

    /// Directory whose `bin/` holds the compiler this stage builds with,
    /// or `None` for the bootstrap stage.
    pub fn compiler_prefix(&self) -> Option<PathBuf> {
        let pred = self.predecessor.as_ref()?;
        Some(match self.role {
            // Instrumented binaries are never installed.
            StageRole::PgoTraining => pred.build_dir(),
            // The optimized rebuild uses the regular toolchain, not the
            // instrumented one that produced the profile.
            StageRole::PgoFinal => self.final_install_dir.clone(),
            _ => pred.install_prefix.clone(),
        })
    }

    /// Installation whose runtime libraries this stage's binaries use.
    pub fn runtime_prefix(&self) -> &Path {
        if self.role.is_lto() || self.role.is_pgo() {
            &self.final_install_dir
        } else {
            &self.install_prefix
        }
    }

    /// Link for the stage that follows this one.
    pub fn link(&self) -> PredecessorLink {
        PredecessorLink {
            number: self.number,
            role: self.role,
            stage_base_dir: self.stage_base_dir.clone(),
            install_prefix: self.install_prefix.clone(),
            runtime_prefix: self.runtime_prefix().to_path_buf(),
        }
    }

    /// `Stage N (role)`, used as a log prefix.
    pub fn label(&self) -> String {
        format!("Stage {} ({})", self.number, self.role)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_paths() {
        let parent = Path::new("/opt/x/yb-llvm-v16-build");
        let final_dir = Path::new("/opt/x/yb-llvm-v16");
        let s1 = Stage::new(1, StageRole::Ordinary, None, parent, final_dir);

        assert_eq!(s1.stage_base_dir(), Path::new("/opt/x/yb-llvm-v16-build/stage-1"));
        assert_eq!(s1.build_dir(), PathBuf::from("/opt/x/yb-llvm-v16-build/stage-1/build"));
        assert_eq!(
            s1.install_prefix(),
            Path::new("/opt/x/yb-llvm-v16-build/stage-1/installed")
        );
        assert_eq!(
            s1.compiler_invocations_dir("1700000000"),
            PathBuf::from("/opt/x/yb-llvm-v16-build/stage-1/compiler_invocations/1700000000")
        );
        assert_eq!(s1.compiler_prefix(), None);
        assert_eq!(s1.label(), "Stage 1 (ordinary)");
    }

    #[test]
    fn test_final_stage_installs_into_final_dir() {
        let parent = Path::new("/p/build");
        let final_dir = Path::new("/p/final");
        let s2 = Stage::new(2, StageRole::Ordinary, None, parent, final_dir);
        let s3 = Stage::new(3, StageRole::FinalOrdinary, Some(s2.link()), parent, final_dir);

        assert_eq!(s3.install_prefix(), final_dir);
        assert_eq!(s3.compiler_prefix(), Some(PathBuf::from("/p/build/stage-2/installed")));
        assert_eq!(s3.runtime_prefix(), final_dir);
    }

    #[test]
    fn test_pgo_compiler_prefixes() {
        let parent = Path::new("/p/build");
        let final_dir = Path::new("/p/final");
        let s4 = Stage::new(4, StageRole::Lto, None, parent, final_dir);
        let s5 = Stage::new(5, StageRole::PgoInstrumented, Some(s4.link()), parent, final_dir);
        let s6 = Stage::new(6, StageRole::PgoTraining, Some(s5.link()), parent, final_dir);
        let s7 = Stage::new(7, StageRole::PgoFinal, Some(s6.link()), parent, final_dir);

        assert_eq!(s5.compiler_prefix(), Some(final_dir.to_path_buf()));
        assert_eq!(s6.compiler_prefix(), Some(PathBuf::from("/p/build/stage-5/build")));
        assert_eq!(s7.compiler_prefix(), Some(final_dir.to_path_buf()));
        assert_eq!(s6.profdata_path(), PathBuf::from("/p/build/stage-6/profiles/clang.profdata"));
        assert_eq!(s5.runtime_prefix(), final_dir);
    }

    #[test]
    fn test_role_predicates() {
        assert!(StageRole::Ordinary.installs());
        assert!(StageRole::FinalOrdinary.installs());
        assert!(!StageRole::Lto.installs());
        assert!(StageRole::Lto.replaces_final_binaries());
        assert!(StageRole::PgoFinal.replaces_final_binaries());
        assert!(!StageRole::PgoInstrumented.replaces_final_binaries());
        assert!(StageRole::PgoTraining.is_pgo());
        assert!(!StageRole::Lto.is_pgo());
    }
}
