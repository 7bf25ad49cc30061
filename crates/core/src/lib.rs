//! machscope-core
//!
//! Core library for decomposing a Mach-O executable into its segment table,
//! encryption and strip state, dynamic library dependencies, package
//! products, and statically linked modules.
//!
//! All substantive logic lives here so it is fully testable and reusable
//! from multiple frontends (CLI, bundle inspector UI, etc.).

pub mod analysis;
pub mod config;
pub mod model;
pub mod services;

pub use model::{BinaryComposition, ModuleInfo, PackageInfo, SegmentInfo};
pub use services::analysis::{analyze_binary, AnalysisError, AnalysisOptions, CompositionAnalyzer};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
