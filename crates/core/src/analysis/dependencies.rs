//! Embedded vs. system dylib classification and package-product detection.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;

use crate::model::PackageInfo;
use crate::services::analysis::InspectionBackend;

const RUNPATH_TOKENS: [&str; 3] = ["@rpath/", "@executable_path/", "@loader_path/"];
const SYSTEM_FRAMEWORKS_DIR: &str = "/System/Library/Frameworks/";
const FRAMEWORK_COMPONENT: &str = ".framework/";
const DYLIB_EXTENSION: &str = ".dylib";

/// Where an install name resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyName {
    Embedded(String),
    System(String),
}

/// Output of the dependency stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    pub embedded: Vec<String>,
    pub system: Vec<String>,
    pub packages: Vec<PackageInfo>,
    pub warnings: Vec<String>,
}

fn package_product_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+)_-?[0-9A-Fa-f]+_PackageProduct$").expect("package product pattern")
    })
}

/// Text before a trailing ` (compatibility version ...)` parenthetical, trimmed.
pub fn strip_version_suffix(line: &str) -> &str {
    let line = line.trim();
    match line.find(" (") {
        Some(idx) => line[..idx].trim_end(),
        None => line,
    }
}

/// Classify one install name. Returns `None` for dependencies that are
/// neither run-path relative nor system frameworks (e.g. `/usr/lib/libSystem.B.dylib`).
pub fn classify_install_name(install_name: &str) -> Option<DependencyName> {
    let path = strip_version_suffix(install_name);

    if let Some(rest) = RUNPATH_TOKENS.iter().find_map(|token| path.strip_prefix(token)) {
        return embedded_name(rest).map(DependencyName::Embedded);
    }

    if let Some(rest) = path.strip_prefix(SYSTEM_FRAMEWORKS_DIR) {
        let name = rest.split(".framework").next().unwrap_or_default();
        let name = name.rsplit('/').next().unwrap_or_default();
        if !name.is_empty() {
            return Some(DependencyName::System(name.to_string()));
        }
    }
    None
}

fn embedded_name(rest: &str) -> Option<String> {
    let name = if let Some(idx) = rest.find(FRAMEWORK_COMPONENT) {
        rest[..idx].rsplit('/').next().unwrap_or_default()
    } else {
        let last = rest.rsplit('/').next().unwrap_or_default();
        last.strip_suffix(DYLIB_EXTENSION).unwrap_or(last)
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Split install names into sorted, de-duplicated, disjoint `(embedded, system)` sets.
///
/// A name seen as both embedded and system is reported as embedded only.
pub fn classify_install_names<S: AsRef<str>>(install_names: &[S]) -> (Vec<String>, Vec<String>) {
    let mut embedded = BTreeSet::new();
    let mut system = BTreeSet::new();
    for name in install_names {
        match classify_install_name(name.as_ref()) {
            Some(DependencyName::Embedded(n)) => {
                embedded.insert(n);
            }
            Some(DependencyName::System(n)) => {
                system.insert(n);
            }
            None => {}
        }
    }
    let system = system.difference(&embedded).cloned().collect();
    (embedded.into_iter().collect(), system)
}

/// Product name of a `<product>_<hash>_PackageProduct` dependency.
pub fn package_product_name(embedded_name: &str) -> Option<&str> {
    package_product_pattern()
        .captures(embedded_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Size of the product under `frameworks_dir`: `<product>.framework`, then
/// `<product>.dylib`, then `<product>`. First existing path wins; 0 if none.
pub fn resolve_package_size(frameworks_dir: &Path, product: &str) -> u64 {
    let candidates = [
        frameworks_dir.join(format!("{product}.framework")),
        frameworks_dir.join(format!("{product}{DYLIB_EXTENSION}")),
        frameworks_dir.join(product),
    ];
    candidates.iter().find(|p| p.exists()).map(|p| path_size(p)).unwrap_or(0)
}

/// File size, or the recursive sum of file sizes for a directory.
/// Unreadable entries count as 0; symlinks are not followed.
fn path_size(path: &Path) -> u64 {
    let Ok(meta) = fs::symlink_metadata(path) else { return 0 };
    if meta.is_file() {
        return meta.len();
    }
    if !meta.is_dir() {
        return 0;
    }
    let Ok(entries) = fs::read_dir(path) else { return 0 };
    entries.filter_map(Result::ok).map(|entry| path_size(&entry.path())).sum()
}

/// Package products among `embedded`, sized from `frameworks_dir` when given.
/// Sorted descending by size, ties by name.
pub fn detect_packages(embedded: &[String], frameworks_dir: Option<&Path>) -> Vec<PackageInfo> {
    let mut packages: Vec<PackageInfo> = embedded
        .iter()
        .filter_map(|full_name| {
            let product = package_product_name(full_name)?;
            let size = frameworks_dir.map(|dir| resolve_package_size(dir, product)).unwrap_or(0);
            Some(PackageInfo { name: product.to_string(), full_name: full_name.clone(), size })
        })
        .collect();
    packages.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
    packages
}

/// Run the dependency stage. Backend failures degrade to empty sets with a warning.
pub fn classify_dependencies(
    backend: &dyn InspectionBackend,
    binary: &Path,
    frameworks_dir: Option<&Path>,
) -> DependencyReport {
    let install_names = match backend.dylib_paths(binary) {
        Ok(names) => names,
        Err(err) => {
            warn!("dylib list unavailable for {}: {}", binary.display(), err);
            return DependencyReport {
                warnings: vec![format!("Dynamic library list unavailable: {err}")],
                ..DependencyReport::default()
            };
        }
    };

    let (embedded, system) = classify_install_names(&install_names);
    let packages = detect_packages(&embedded, frameworks_dir);
    debug!(
        "{} install names: {} embedded, {} system, {} package products",
        install_names.len(),
        embedded.len(),
        system.len(),
        packages.len()
    );
    DependencyReport { embedded, system, packages, warnings: Vec::new() }
}
