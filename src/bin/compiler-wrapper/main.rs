//! Compiler wrapper installed as `build-clang-cc` and `build-clang-cxx`.
//!
//! The C++ flavor is selected by the name the binary is invoked as.

use std::path::Path;

use build_clang::builder::compiler_wrapper::{run_wrapper, CXX_WRAPPER_NAME};

fn main() {
    let mut args = std::env::args();
    let argv0 = args.next().unwrap_or_default();
    let is_cxx = Path::new(&argv0)
        .file_name()
        .map(|name| name.to_string_lossy() == CXX_WRAPPER_NAME)
        .unwrap_or(false);

    match run_wrapper(is_cxx, args.collect()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}
