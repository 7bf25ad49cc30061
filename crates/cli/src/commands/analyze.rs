use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use machscope_core::config::AnalyzerConfig;
use machscope_core::services::analysis::{AnalysisRequest, BackendRegistry, CompositionAnalyzer};
use machscope_core::BinaryComposition;

use crate::{canonicalize_or_current, default_frameworks_dir, format_bytes};

/// Load the analyzer config from `path`, or defaults when none is given.
pub fn load_config(path: Option<&str>) -> Result<AnalyzerConfig> {
    match path {
        Some(p) => AnalyzerConfig::load(&canonicalize_or_current(p)?)
            .with_context(|| format!("Failed to load config {p}")),
        None => Ok(AnalyzerConfig::default()),
    }
}

/// Analyze one Mach-O binary and print its composition.
///
/// CLI flags override config values; the frameworks directory falls back to
/// `<binary dir>/Frameworks` when neither names one.
pub fn analyze_command(
    path: &str,
    frameworks_dir: Option<&str>,
    backend: Option<&str>,
    config_path: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let binary_path = canonicalize_or_current(path)?;

    let backend_name = backend.map(str::to_string).unwrap_or_else(|| config.backend.clone());
    let registry = BackendRegistry::from_config(&config);
    let backend = registry.require(&backend_name)?;

    let frameworks_dir = frameworks_dir
        .map(PathBuf::from)
        .or_else(|| config.frameworks_dir.clone())
        .or_else(|| default_frameworks_dir(&binary_path));
    let request = AnalysisRequest::new(&binary_path).with_frameworks_dir(frameworks_dir);

    let composition = CompositionAnalyzer::new(backend)
        .analyze(&request)
        .with_context(|| format!("Failed to analyze {}", binary_path.display()))?;

    if json {
        let serialized = serde_json::to_string_pretty(&composition)
            .context("Failed to serialize composition to JSON")?;
        println!("{}", serialized);
    } else {
        print!("{}", render_composition(&composition));
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Human-readable report of a composition.
pub fn render_composition(c: &BinaryComposition) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "Binary: {}", c.binary_name);
    let _ = writeln!(out, "  Size: {} ({} bytes)", format_bytes(c.total_size), c.total_size);
    let _ = writeln!(out, "  Encrypted: {}", yes_no(c.is_encrypted));
    let _ = writeln!(out, "  Stripped: {}", yes_no(c.is_stripped));

    let _ = writeln!(out, "Segments ({}):", c.segments.len());
    for seg in &c.segments {
        let _ = writeln!(
            out,
            "  - {} {} (vmaddr 0x{:X}, fileoff {})",
            seg.name,
            format_bytes(seg.size),
            seg.vm_address,
            seg.file_offset
        );
    }

    let _ = writeln!(out, "Embedded libraries ({}):", c.embedded_libraries.len());
    for name in &c.embedded_libraries {
        let _ = writeln!(out, "  - {name}");
    }

    let _ = writeln!(out, "System frameworks ({}):", c.system_frameworks.len());
    for name in &c.system_frameworks {
        let _ = writeln!(out, "  - {name}");
    }

    let _ = writeln!(out, "Package products ({}):", c.spm_packages.len());
    for pkg in &c.spm_packages {
        let size = if pkg.size > 0 { format_bytes(pkg.size) } else { "size unknown".to_string() };
        let _ = writeln!(out, "  - {} [{}] {}", pkg.name, pkg.full_name, size);
    }

    let _ = writeln!(out, "Static modules ({}):", c.static_modules.len());
    for module in &c.static_modules {
        let _ = writeln!(
            out,
            "  - {} ({} symbols, ~{})",
            module.name,
            module.symbol_count,
            format_bytes(module.estimated_size)
        );
    }
    if !c.static_modules.is_empty() {
        let _ = writeln!(
            out,
            "  Attributed: ~{} of {} __TEXT",
            format_bytes(c.attributed_module_size()),
            format_bytes(c.text_segment_size())
        );
    }

    if !c.analysis_warnings.is_empty() {
        let _ = writeln!(out, "Warnings:");
        for warning in &c.analysis_warnings {
            let _ = writeln!(out, "  ! {warning}");
        }
    }
    out
}
