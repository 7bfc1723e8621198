//! Stage build engine.
//!
//! This module derives what every stage builds and drives CMake and ninja
//! to build it.

pub mod arch;
pub mod cmake;
pub mod compiler_wrapper;
pub mod compilers;
pub mod executor;
pub mod graph;
pub mod matrix;
pub mod options;
pub mod tools;

pub use cmake::CMakeBuilder;
pub use executor::StageExecutor;
pub use graph::StageGraph;
pub use matrix::{derive, StageConfig};
pub use options::{CMakeOptions, OptionValue};
pub use tools::BuildTools;
