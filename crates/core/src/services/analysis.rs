use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{
    assemble, attribute_modules, classify_dependencies, is_macho_magic, read_header,
    CompositionParts,
};
use crate::config::AnalyzerConfig;
use crate::model::{BinaryComposition, SegmentInfo};

/// Raw facts recovered from a binary's load-command stream.
///
/// Segments are kept in load-command order and unfiltered; the header stage
/// decides what is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadCommandSummary {
    pub segments: Vec<SegmentInfo>,
    /// `cryptid` of the first encryption-info command, if one exists.
    pub cryptid: Option<u32>,
    /// Entry count of `LC_SYMTAB`, `None` when the command is absent.
    pub symbol_count: Option<u32>,
    /// `nlocalsym` of `LC_DYSYMTAB`, `None` when the command is absent.
    pub local_symbol_count: Option<u32>,
}

/// Options that shape a single analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Directory holding the app's embedded frameworks/dylibs, used to size package products.
    pub frameworks_dir: Option<PathBuf>,
}

/// Request to analyze one Mach-O executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub binary_path: PathBuf,
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self { binary_path: binary_path.into(), options: AnalysisOptions::default() }
    }

    pub fn with_frameworks_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.options.frameworks_dir = dir;
        self
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Binary not found at {0}")]
    MissingBinary(PathBuf),
    #[error("Not a Mach-O binary: {0}")]
    NotMachO(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed Mach-O: {0}")]
    Parse(String),
    #[error("Backend not found: {0}")]
    MissingBackend(String),
    #[error("Inspection backend error: {0}")]
    Backend(String),
    #[error("{tool} did not finish within {after:?}")]
    Timeout { tool: String, after: Duration },
}

/// Source of raw load-command, dylib, and symbol data for a binary.
///
/// Each call is independent and reads the binary afresh, so stages can run
/// concurrently against the same backend.
pub trait InspectionBackend: Send + Sync {
    fn load_commands(&self, binary: &Path) -> Result<LoadCommandSummary, AnalysisError>;

    /// Install names of every dylib load command, in load-command order.
    fn dylib_paths(&self, binary: &Path) -> Result<Vec<String>, AnalysisError>;

    /// One text line per symbol-table entry.
    fn symbol_lines(&self, binary: &Path) -> Result<Vec<String>, AnalysisError>;

    fn name(&self) -> &'static str;
}

/// Registry for inspection backends; callers select by name.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn InspectionBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self { backends: HashMap::new() }
    }

    /// Registry populated with every compiled-in backend, configured from `config`.
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "native-backend")]
        {
            registry.register(crate::services::backends::NativeBackend);
        }
        registry.register(crate::services::backends::ToolsBackend::from_config(config));
        registry
    }

    pub fn register<B: InspectionBackend + 'static>(&mut self, backend: B) -> &mut Self {
        self.backends.insert(backend.name().to_string(), Box::new(backend));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn InspectionBackend> {
        self.backends.get(name).map(|b| &**b)
    }

    /// Like [`get`](Self::get) but reports the known names when `name` is unregistered.
    pub fn require(&self, name: &str) -> Result<&dyn InspectionBackend, AnalysisError> {
        self.get(name).ok_or_else(|| {
            AnalysisError::MissingBackend(format!(
                "'{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    /// Return a sorted list of registered backend names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.backends.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry with every compiled-in backend using default settings.
pub fn default_backend_registry() -> BackendRegistry {
    BackendRegistry::from_config(&AnalyzerConfig::default())
}

/// Runs the analysis stages against one backend and assembles the result.
pub struct CompositionAnalyzer<'a> {
    pub backend: &'a dyn InspectionBackend,
}

impl<'a> CompositionAnalyzer<'a> {
    pub fn new(backend: &'a dyn InspectionBackend) -> Self {
        Self { backend }
    }

    /// Analyze the binary named by `request`.
    ///
    /// Only an unreadable or non-Mach-O input is an error. Every stage failure
    /// after that degrades to an empty section plus a warning.
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<BinaryComposition, AnalysisError> {
        let path = request.binary_path.as_path();
        let total_size = validate_binary(path)?;
        let binary_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        debug!("analyzing {} ({} bytes) with {} backend", binary_name, total_size, self.backend.name());

        let header = read_header(self.backend, path);
        let frameworks_dir = request.options.frameworks_dir.as_deref();

        // Dependencies and modules only share the read-only path and header values.
        let (dependencies, modules) = rayon::join(
            || classify_dependencies(self.backend, path, frameworks_dir),
            || attribute_modules(self.backend, path, header.text_segment_size, header.is_stripped),
        );

        Ok(assemble(CompositionParts { binary_name, total_size, header, dependencies, modules }))
    }
}

/// Analyze `path` with the default backend.
pub fn analyze_binary(
    path: impl Into<PathBuf>,
    options: AnalysisOptions,
) -> Result<BinaryComposition, AnalysisError> {
    let request = AnalysisRequest { binary_path: path.into(), options };
    #[cfg(feature = "native-backend")]
    let backend = crate::services::backends::NativeBackend;
    #[cfg(not(feature = "native-backend"))]
    let backend = crate::services::backends::ToolsBackend::default();
    CompositionAnalyzer::new(&backend).analyze(&request)
}

/// Check that `path` is a readable Mach-O (thin or universal) and return its size.
fn validate_binary(path: &Path) -> Result<u64, AnalysisError> {
    if !path.is_file() {
        return Err(AnalysisError::MissingBinary(path.to_path_buf()));
    }
    let io_err = |source| AnalysisError::Io { path: path.to_path_buf(), source };
    let metadata = fs::metadata(path).map_err(io_err)?;

    let mut magic = [0u8; 4];
    let mut file = File::open(path).map_err(io_err)?;
    if file.read_exact(&mut magic).is_err() || !is_macho_magic(&magic) {
        return Err(AnalysisError::NotMachO(path.to_path_buf()));
    }
    Ok(metadata.len())
}
