//! Static-module attribution from length-prefixed mangled symbol names.
//!
//! Not a demangler: only the first identifier after a Swift mangling marker
//! is read, which is the module name.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};

use crate::model::ModuleInfo;
use crate::services::analysis::InspectionBackend;

/// Markers that precede the length-prefixed module name.
pub const MANGLING_MARKERS: [&str; 3] = ["$s", "$S", "_T0"];
/// Modules tallied fewer times than this are noise.
pub const MODULE_NOISE_THRESHOLD: u64 = 10;
pub const MAX_MODULE_NAME_LEN: usize = 50;
pub const MIN_MODULE_NAME_LEN: usize = 2;

/// System and runtime modules never reported as statically linked.
pub const EXCLUDED_MODULES: &[&str] = &[
    "ARKit",
    "AVFoundation",
    "AVKit",
    "AppKit",
    "AuthenticationServices",
    "CloudKit",
    "Combine",
    "Contacts",
    "ContactsUI",
    "CoreData",
    "CoreFoundation",
    "CoreGraphics",
    "CoreImage",
    "CoreLocation",
    "CoreML",
    "CoreMedia",
    "CoreText",
    "CoreVideo",
    "CryptoKit",
    "Darwin",
    "Dispatch",
    "Foundation",
    "GameplayKit",
    "HealthKit",
    "LocalAuthentication",
    "MapKit",
    "Metal",
    "MetalKit",
    "Network",
    "ObjectiveC",
    "Observation",
    "Photos",
    "PhotosUI",
    "QuartzCore",
    "SceneKit",
    "Security",
    "SpriteKit",
    "StoreKit",
    "Swift",
    "SwiftOnoneSupport",
    "SwiftUI",
    "UIKit",
    "UserNotifications",
    "WebKit",
    "WidgetKit",
    "XCTest",
    "_Concurrency",
    "_StringProcessing",
    "os",
];

/// Output of the module stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleReport {
    pub modules: Vec<ModuleInfo>,
    pub warnings: Vec<String>,
}

pub fn is_excluded_module(name: &str) -> bool {
    EXCLUDED_MODULES.contains(&name)
}

/// Module name following the earliest mangling marker in `line`, if it is well formed.
pub fn module_name_from_symbol(line: &str) -> Option<&str> {
    let (pos, marker) = MANGLING_MARKERS
        .iter()
        .filter_map(|m| line.find(m).map(|pos| (pos, *m)))
        .min_by_key(|(pos, _)| *pos)?;
    let after = &line[pos + marker.len()..];

    let digits_len = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    let len: usize = after[..digits_len].parse().ok()?;
    if len == 0 || len > MAX_MODULE_NAME_LEN {
        return None;
    }

    let name = after[digits_len..].get(..len)?;
    let well_formed = name.len() >= MIN_MODULE_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    well_formed.then_some(name)
}

/// Occurrence count per module name across all symbol lines.
pub fn tally_modules<S: AsRef<str>>(lines: &[S]) -> BTreeMap<String, u64> {
    let mut tallies = BTreeMap::new();
    for line in lines {
        if let Some(name) = module_name_from_symbol(line.as_ref()) {
            *tallies.entry(name.to_string()).or_insert(0) += 1;
        }
    }
    tallies
}

/// Turn tallies into reported modules.
///
/// The size denominator is the total of every tally, including names later
/// dropped as excluded or noise. Estimates sum to at most `text_segment_size`.
pub fn attribute(tallies: &BTreeMap<String, u64>, text_segment_size: u64) -> Vec<ModuleInfo> {
    let total: u64 = tallies.values().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut modules: Vec<ModuleInfo> = tallies
        .iter()
        .filter(|(name, count)| **count >= MODULE_NOISE_THRESHOLD && !is_excluded_module(name))
        .map(|(name, &count)| ModuleInfo {
            name: name.clone(),
            symbol_count: count,
            estimated_size: (u128::from(count) * u128::from(text_segment_size)
                / u128::from(total)) as u64,
        })
        .collect();
    modules.sort_by(|a, b| b.symbol_count.cmp(&a.symbol_count).then_with(|| a.name.cmp(&b.name)));
    modules
}

/// Run the module stage. Stripped binaries short-circuit to no modules;
/// an unavailable symbol dump degrades to no modules with a warning.
pub fn attribute_modules(
    backend: &dyn InspectionBackend,
    binary: &Path,
    text_segment_size: u64,
    is_stripped: bool,
) -> ModuleReport {
    if is_stripped {
        debug!("{} is stripped; skipping module attribution", binary.display());
        return ModuleReport::default();
    }

    let lines = match backend.symbol_lines(binary) {
        Ok(lines) => lines,
        Err(err) => {
            warn!("symbol table unavailable for {}: {}", binary.display(), err);
            return ModuleReport {
                modules: Vec::new(),
                warnings: vec![format!("Symbol table unavailable: {err}")],
            };
        }
    };

    let tallies = tally_modules(&lines);
    let modules = attribute(&tallies, text_segment_size);
    debug!(
        "{} symbols, {} candidate modules, {} reported",
        lines.len(),
        tallies.len(),
        modules.len()
    );
    ModuleReport { modules, warnings: Vec::new() }
}
