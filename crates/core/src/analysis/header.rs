//! Segment table, encryption state, and strip state from the load-command stream.

use std::path::Path;

use log::{debug, warn};

use crate::model::SegmentInfo;
use crate::services::analysis::InspectionBackend;

/// Reservation segment that maps the null page; never shown.
pub const PAGEZERO_SEGMENT: &str = "__PAGEZERO";
pub const TEXT_SEGMENT: &str = "__TEXT";

const MH_MAGIC: u32 = 0xFEED_FACE;
const MH_CIGAM: u32 = 0xCEFA_EDFE;
const MH_MAGIC_64: u32 = 0xFEED_FACF;
const MH_CIGAM_64: u32 = 0xCFFA_EDFE;
const FAT_MAGIC: u32 = 0xCAFE_BABE;
const FAT_CIGAM: u32 = 0xBEBA_FECA;
const FAT_MAGIC_64: u32 = 0xCAFE_BABF;
const FAT_CIGAM_64: u32 = 0xBFBA_FECA;

/// Output of the header stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderReport {
    /// Visible segments: non-empty, no `__PAGEZERO`, descending by size.
    pub segments: Vec<SegmentInfo>,
    pub text_segment_size: u64,
    pub is_encrypted: bool,
    pub is_stripped: bool,
    pub warnings: Vec<String>,
}

/// True for thin (either endianness, 32/64-bit) and universal Mach-O magics.
pub fn is_macho_magic(bytes: &[u8; 4]) -> bool {
    let magic = u32::from_be_bytes(*bytes);
    matches!(
        magic,
        MH_MAGIC
            | MH_CIGAM
            | MH_MAGIC_64
            | MH_CIGAM_64
            | FAT_MAGIC
            | FAT_CIGAM
            | FAT_MAGIC_64
            | FAT_CIGAM_64
    )
}

/// Drop empty and `__PAGEZERO` segments, then sort descending by size.
///
/// The sort is stable, so equally sized segments keep load-command order.
pub fn visible_segments(segments: Vec<SegmentInfo>) -> Vec<SegmentInfo> {
    let mut visible: Vec<SegmentInfo> = segments
        .into_iter()
        .filter(|s| s.size > 0 && s.name != PAGEZERO_SEGMENT)
        .collect();
    visible.sort_by(|a, b| b.size.cmp(&a.size));
    visible
}

/// Size of the first `__TEXT` segment, or 0.
pub fn text_segment_size(segments: &[SegmentInfo]) -> u64 {
    segments.iter().find(|s| s.name == TEXT_SEGMENT).map(|s| s.size).unwrap_or(0)
}

/// A nonzero `cryptid` marks FairPlay-style encryption; zero or absent does not.
pub fn is_encrypted(cryptid: Option<u32>) -> bool {
    cryptid.is_some_and(|id| id != 0)
}

/// Stripped when there is no symbol table, it has no entries, or the dynamic
/// symbol table reports no local symbols.
///
/// Linked executables keep their undefined imports in `LC_SYMTAB` after
/// `strip`, so the entry count alone only catches images without imports.
pub fn is_stripped(symbol_count: Option<u32>, local_symbol_count: Option<u32>) -> bool {
    symbol_count.is_none_or(|n| n == 0) || local_symbol_count == Some(0)
}

/// Run the header stage. Backend failures degrade to an empty, unencrypted,
/// stripped report with a warning.
pub fn read_header(backend: &dyn InspectionBackend, binary: &Path) -> HeaderReport {
    match backend.load_commands(binary) {
        Ok(summary) => {
            let text_segment_size = text_segment_size(&summary.segments);
            let segments = visible_segments(summary.segments);
            debug!(
                "{} visible segments, __TEXT {} bytes, cryptid {:?}, nsyms {:?}, nlocalsym {:?}",
                segments.len(),
                text_segment_size,
                summary.cryptid,
                summary.symbol_count,
                summary.local_symbol_count
            );
            HeaderReport {
                segments,
                text_segment_size,
                is_encrypted: is_encrypted(summary.cryptid),
                is_stripped: is_stripped(summary.symbol_count, summary.local_symbol_count),
                warnings: Vec::new(),
            }
        }
        Err(err) => {
            warn!("load commands unavailable for {}: {}", binary.display(), err);
            HeaderReport {
                is_stripped: true,
                warnings: vec![format!("Load commands unavailable: {err}")],
                ..HeaderReport::default()
            }
        }
    }
}
