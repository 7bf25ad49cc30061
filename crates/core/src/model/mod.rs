//! Core data model for a Mach-O composition analysis.
//!
//! Every type here is built once per analysis and never mutated afterwards.
//! Field names serialize in camelCase so the JSON matches what the bundle
//! inspector UI already reads.

use serde::{Deserialize, Serialize};

/// A named region of the binary's virtual-memory layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    pub name: String,
    /// Virtual-memory size in bytes. Always > 0 for segments exposed in a composition.
    pub size: u64,
    pub vm_address: u64,
    pub file_offset: u64,
}

impl SegmentInfo {
    pub fn new(name: impl Into<String>, size: u64, vm_address: u64, file_offset: u64) -> Self {
        Self { name: name.into(), size, vm_address, file_offset }
    }
}

/// A dependency produced by a package manager build (`<product>_<hash>_PackageProduct`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Canonical product name, e.g. `Alamofire`.
    pub name: String,
    /// Raw embedded dependency name the product was parsed from.
    pub full_name: String,
    /// Size on disk in bytes, 0 when nothing could be resolved.
    pub size: u64,
}

/// A statically linked module inferred from mangled symbol names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub name: String,
    pub symbol_count: u64,
    /// Share of the `__TEXT` segment proportional to `symbol_count`. Derived, not measured.
    pub estimated_size: u64,
}

/// Root result of analyzing one binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryComposition {
    pub binary_name: String,
    pub total_size: u64,
    pub segments: Vec<SegmentInfo>,
    pub is_encrypted: bool,
    pub is_stripped: bool,
    pub analysis_warnings: Vec<String>,
    pub spm_packages: Vec<PackageInfo>,
    pub system_frameworks: Vec<String>,
    pub embedded_libraries: Vec<String>,
    pub static_modules: Vec<ModuleInfo>,
}

impl BinaryComposition {
    /// Size of the `__TEXT` segment, or 0 when the binary exposes none.
    pub fn text_segment_size(&self) -> u64 {
        crate::analysis::header::text_segment_size(&self.segments)
    }

    /// Sum of the estimated sizes of all attributed static modules.
    pub fn attributed_module_size(&self) -> u64 {
        self.static_modules.iter().map(|m| m.estimated_size).sum()
    }
}
