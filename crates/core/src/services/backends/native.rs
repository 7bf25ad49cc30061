use std::fs;
use std::path::Path;

use goblin::mach::cputype::{CPU_TYPE_ARM64, CPU_TYPE_X86_64};
use goblin::mach::fat::{FatArch, FAT_MAGIC};
use goblin::mach::load_command::CommandVariant;
use goblin::mach::{peek, MachO, MultiArch};

use crate::model::SegmentInfo;
use crate::services::analysis::{AnalysisError, InspectionBackend, LoadCommandSummary};

/// Reads the load-command stream and symbol table directly with goblin.
pub struct NativeBackend;

impl NativeBackend {
    fn with_image<T>(
        &self,
        binary: &Path,
        f: impl FnOnce(&MachO<'_>) -> Result<T, AnalysisError>,
    ) -> Result<T, AnalysisError> {
        let bytes = fs::read(binary)
            .map_err(|source| AnalysisError::Io { path: binary.to_path_buf(), source })?;
        let image = select_slice(&bytes)?;
        let macho = MachO::parse(image, 0)
            .map_err(|e| AnalysisError::Parse(format!("failed to parse Mach-O: {e}")))?;
        f(&macho)
    }
}

impl InspectionBackend for NativeBackend {
    fn load_commands(&self, binary: &Path) -> Result<LoadCommandSummary, AnalysisError> {
        self.with_image(binary, |macho| {
            let mut summary = LoadCommandSummary::default();
            for segment in macho.segments.iter() {
                // Segments whose names are not valid UTF-8 are skipped.
                let Ok(name) = segment.name() else { continue };
                summary.segments.push(SegmentInfo::new(
                    name,
                    segment.vmsize,
                    segment.vmaddr,
                    segment.fileoff,
                ));
            }

            for lc in &macho.load_commands {
                match &lc.command {
                    CommandVariant::EncryptionInfo32(info) => {
                        summary.cryptid.get_or_insert(info.cryptid);
                    }
                    CommandVariant::EncryptionInfo64(info) => {
                        summary.cryptid.get_or_insert(info.cryptid);
                    }
                    CommandVariant::Symtab(symtab) => summary.symbol_count = Some(symtab.nsyms),
                    CommandVariant::Dysymtab(dysymtab) => {
                        summary.local_symbol_count = Some(dysymtab.nlocalsym)
                    }
                    _ => {}
                }
            }
            Ok(summary)
        })
    }

    fn dylib_paths(&self, binary: &Path) -> Result<Vec<String>, AnalysisError> {
        // goblin reserves index 0 of `libs` for the image itself.
        self.with_image(binary, |macho| {
            Ok(macho.libs.iter().skip(1).map(|lib| lib.to_string()).collect())
        })
    }

    fn symbol_lines(&self, binary: &Path) -> Result<Vec<String>, AnalysisError> {
        self.with_image(binary, |macho| {
            let mut lines = Vec::new();
            for sym in macho.symbols() {
                let Ok((name, _nlist)) = sym else { continue };
                if !name.is_empty() {
                    lines.push(name.to_string());
                }
            }
            Ok(lines)
        })
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Pick the slice to analyze. Thin images are returned as-is; universal
/// images prefer arm64, then x86_64, then the first architecture.
fn select_slice(bytes: &[u8]) -> Result<&[u8], AnalysisError> {
    let magic = peek(bytes, 0).map_err(|e| AnalysisError::Parse(format!("missing magic: {e}")))?;
    if magic != FAT_MAGIC {
        return Ok(bytes);
    }

    let multi = MultiArch::new(bytes)
        .map_err(|e| AnalysisError::Parse(format!("failed to parse fat header: {e}")))?;
    let arches: Vec<FatArch> = multi.iter_arches().filter_map(Result::ok).collect();
    let arch = arches
        .iter()
        .find(|a| a.cputype == CPU_TYPE_ARM64)
        .or_else(|| arches.iter().find(|a| a.cputype == CPU_TYPE_X86_64))
        .or_else(|| arches.first())
        .ok_or_else(|| AnalysisError::Parse("universal binary has no architectures".into()))?;

    let start = arch.offset as usize;
    let end = start.checked_add(arch.size as usize);
    end.and_then(|end| bytes.get(start..end)).ok_or_else(|| {
        AnalysisError::Parse(format!(
            "fat slice {}..+{} exceeds file length {}",
            arch.offset,
            arch.size,
            bytes.len()
        ))
    })
}
