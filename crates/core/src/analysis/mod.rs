//! Analysis stages that turn raw inspection data into a [`BinaryComposition`].
//!
//! - `header`: segment table, encryption flag, strip state
//! - `dependencies`: embedded vs. system dylibs and package products
//! - `modules`: static-module attribution from symbol names
//!
//! Each stage degrades to an empty section on backend failure; [`assemble`]
//! merges their outputs and never fails.

pub mod dependencies;
pub mod header;
pub mod modules;

pub use dependencies::{classify_dependencies, DependencyReport};
pub use header::{is_macho_magic, read_header, HeaderReport};
pub use modules::{attribute_modules, ModuleReport};

use crate::model::BinaryComposition;

/// Warning appended when the binary carries a nonzero `cryptid`.
pub const ENCRYPTED_WARNING: &str = "Binary is encrypted (FairPlay DRM)";

/// Stage outputs handed to [`assemble`].
#[derive(Debug, Clone)]
pub struct CompositionParts {
    pub binary_name: String,
    pub total_size: u64,
    pub header: HeaderReport,
    pub dependencies: DependencyReport,
    pub modules: ModuleReport,
}

/// Merge stage outputs into the final composition.
pub fn assemble(parts: CompositionParts) -> BinaryComposition {
    let CompositionParts { binary_name, total_size, header, dependencies, modules } = parts;

    let mut analysis_warnings = header.warnings;
    analysis_warnings.extend(dependencies.warnings);
    analysis_warnings.extend(modules.warnings);
    if header.is_encrypted {
        analysis_warnings.push(ENCRYPTED_WARNING.to_string());
    }

    BinaryComposition {
        binary_name,
        total_size,
        segments: header.segments,
        is_encrypted: header.is_encrypted,
        is_stripped: header.is_stripped,
        analysis_warnings,
        spm_packages: dependencies.packages,
        system_frameworks: dependencies.system,
        embedded_libraries: dependencies.embedded,
        static_modules: modules.modules,
    }
}
