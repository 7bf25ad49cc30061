//! Synthesizes minimal little-endian 64-bit `MH_EXECUTE` images for tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

const MH_MAGIC_64: u32 = 0xFEED_FACF;
const CPU_TYPE_ARM64: u32 = 0x0100_000C;
const MH_EXECUTE: u32 = 0x2;
const LC_SYMTAB: u32 = 0x2;
const LC_DYSYMTAB: u32 = 0xB;
const LC_LOAD_DYLIB: u32 = 0xC;
const LC_SEGMENT_64: u32 = 0x19;
const LC_ENCRYPTION_INFO_64: u32 = 0x2C;
const HEADER_SIZE: usize = 32;

pub const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
struct Segment {
    name: String,
    vmaddr: u64,
    vmsize: u64,
    fileoff: u64,
}

/// Builder for a Mach-O executable with segments, dylibs, encryption info,
/// and an optional symbol table. Segments carry no file data (`filesize` 0).
#[derive(Debug, Clone, Default)]
pub struct MachOBuilder {
    segments: Vec<Segment>,
    dylibs: Vec<String>,
    cryptid: Option<u32>,
    symbols: Option<Vec<String>>,
    local_symbols: Option<u32>,
    trailing: Vec<u8>,
    pad_to: Option<usize>,
}

impl MachOBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segment(mut self, name: &str, vmaddr: u64, vmsize: u64, fileoff: u64) -> Self {
        self.segments.push(Segment { name: name.to_string(), vmaddr, vmsize, fileoff });
        self
    }

    pub fn dylib(mut self, install_name: &str) -> Self {
        self.dylibs.push(install_name.to_string());
        self
    }

    pub fn encryption(mut self, cryptid: u32) -> Self {
        self.cryptid = Some(cryptid);
        self
    }

    /// Adds an `LC_SYMTAB` with one entry per name. An empty list yields `nsyms == 0`.
    pub fn symbols<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an `LC_DYSYMTAB` whose first `count` symbols are locals and the rest
    /// external definitions.
    pub fn local_symbols(mut self, count: u32) -> Self {
        self.local_symbols = Some(count);
        self
    }

    /// Raw bytes appended after the symbol/string tables.
    pub fn trailing_bytes(mut self, bytes: &[u8]) -> Self {
        self.trailing.extend_from_slice(bytes);
        self
    }

    /// Zero-pad the image to at least `len` bytes.
    pub fn pad_to(mut self, len: usize) -> Self {
        self.pad_to = Some(len);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut commands: Vec<Vec<u8>> = Vec::new();

        for seg in &self.segments {
            let mut cmd = Vec::with_capacity(72);
            put_u32(&mut cmd, LC_SEGMENT_64);
            put_u32(&mut cmd, 72);
            let mut segname = [0u8; 16];
            let n = seg.name.len().min(16);
            segname[..n].copy_from_slice(&seg.name.as_bytes()[..n]);
            cmd.extend_from_slice(&segname);
            put_u64(&mut cmd, seg.vmaddr);
            put_u64(&mut cmd, seg.vmsize);
            put_u64(&mut cmd, seg.fileoff);
            put_u64(&mut cmd, 0); // filesize
            put_u32(&mut cmd, 5); // maxprot
            put_u32(&mut cmd, 5); // initprot
            put_u32(&mut cmd, 0); // nsects
            put_u32(&mut cmd, 0); // flags
            commands.push(cmd);
        }

        for name in &self.dylibs {
            let cmdsize = align8(24 + name.len() + 1);
            let mut cmd = Vec::with_capacity(cmdsize);
            put_u32(&mut cmd, LC_LOAD_DYLIB);
            put_u32(&mut cmd, cmdsize as u32);
            put_u32(&mut cmd, 24); // name offset
            put_u32(&mut cmd, 2); // timestamp
            put_u32(&mut cmd, 0x1_0000); // current version
            put_u32(&mut cmd, 0x1_0000); // compatibility version
            cmd.extend_from_slice(name.as_bytes());
            cmd.resize(cmdsize, 0);
            commands.push(cmd);
        }

        if let Some(cryptid) = self.cryptid {
            let mut cmd = Vec::with_capacity(24);
            put_u32(&mut cmd, LC_ENCRYPTION_INFO_64);
            put_u32(&mut cmd, 24);
            put_u32(&mut cmd, 0x4000); // cryptoff
            put_u32(&mut cmd, 0x1000); // cryptsize
            put_u32(&mut cmd, cryptid);
            put_u32(&mut cmd, 0); // pad
            commands.push(cmd);
        }

        if let Some(nlocal) = self.local_symbols {
            let total = self.symbols.as_ref().map_or(0, Vec::len) as u32;
            let mut cmd = Vec::with_capacity(80);
            put_u32(&mut cmd, LC_DYSYMTAB);
            put_u32(&mut cmd, 80);
            put_u32(&mut cmd, 0); // ilocalsym
            put_u32(&mut cmd, nlocal);
            put_u32(&mut cmd, nlocal); // iextdefsym
            put_u32(&mut cmd, total.saturating_sub(nlocal)); // nextdefsym
            put_u32(&mut cmd, total); // iundefsym
            // nundefsym and the unused table offsets/counts.
            cmd.resize(80, 0);
            commands.push(cmd);
        }

        let has_symtab = self.symbols.is_some();
        if has_symtab {
            // Offsets are patched once the load-command size is known.
            commands.push(vec![0u8; 24]);
        }

        let sizeofcmds: usize = commands.iter().map(Vec::len).sum();
        let data_start = HEADER_SIZE + sizeofcmds;

        // Symbol table and string table.
        let names = self.symbols.clone().unwrap_or_default();
        let mut strtab = vec![0u8]; // index 0 is the empty string
        let mut nlists = Vec::with_capacity(names.len() * 16);
        for (i, name) in names.iter().enumerate() {
            let strx = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            put_u32(&mut nlists, strx);
            nlists.push(0x0F); // N_SECT | N_EXT
            nlists.push(1); // n_sect
            nlists.extend_from_slice(&0u16.to_le_bytes());
            put_u64(&mut nlists, 0x1_0000_4000 + i as u64 * 4);
        }
        strtab.resize(align8(strtab.len().max(8)), 0);

        if has_symtab {
            let symoff = data_start as u32;
            let stroff = (data_start + nlists.len()) as u32;
            let mut cmd = Vec::with_capacity(24);
            put_u32(&mut cmd, LC_SYMTAB);
            put_u32(&mut cmd, 24);
            put_u32(&mut cmd, symoff);
            put_u32(&mut cmd, names.len() as u32);
            put_u32(&mut cmd, stroff);
            put_u32(&mut cmd, strtab.len() as u32);
            if let Some(last) = commands.last_mut() {
                *last = cmd;
            }
        }

        let mut out = Vec::new();
        put_u32(&mut out, MH_MAGIC_64);
        put_u32(&mut out, CPU_TYPE_ARM64);
        put_u32(&mut out, 0); // cpusubtype
        put_u32(&mut out, MH_EXECUTE);
        put_u32(&mut out, commands.len() as u32);
        put_u32(&mut out, sizeofcmds as u32);
        put_u32(&mut out, 0); // flags
        put_u32(&mut out, 0); // reserved
        for cmd in &commands {
            out.extend_from_slice(cmd);
        }
        if has_symtab {
            out.extend_from_slice(&nlists);
            out.extend_from_slice(&strtab);
        }
        out.extend_from_slice(&self.trailing);
        // Keep a little slack after the last table.
        out.resize(out.len() + 16, 0);
        if let Some(len) = self.pad_to {
            if out.len() < len {
                out.resize(len, 0);
            }
        }
        out
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.build()).expect("write Mach-O fixture");
        path
    }
}

/// Wrap thin images in a big-endian `FAT_MAGIC` container.
pub fn fat_image(slices: &[(u32, Vec<u8>)]) -> Vec<u8> {
    const ALIGN: usize = 0x1000;
    let header_len = 8 + slices.len() * 20;
    let mut offsets = Vec::with_capacity(slices.len());
    let mut cursor = align_to(header_len, ALIGN);
    for (_, bytes) in slices {
        offsets.push(cursor);
        cursor = align_to(cursor + bytes.len(), ALIGN);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    out.extend_from_slice(&(slices.len() as u32).to_be_bytes());
    for ((cputype, bytes), offset) in slices.iter().zip(&offsets) {
        out.extend_from_slice(&cputype.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // cpusubtype
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&12u32.to_be_bytes()); // align (2^12)
    }
    for ((_, bytes), offset) in slices.iter().zip(&offsets) {
        out.resize(*offset, 0);
        out.extend_from_slice(bytes);
    }
    out
}

/// `count` distinct Swift-mangled symbol names attributed to `module`.
pub fn swift_symbols(module: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("_$s{}{}4Type{}C4workyyF", module.len(), module, i)).collect()
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn align8(n: usize) -> usize {
    align_to(n, 8)
}

fn align_to(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}
