use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::analysis::dependencies::strip_version_suffix;
use crate::config::AnalyzerConfig;
use crate::model::SegmentInfo;
use crate::services::analysis::{AnalysisError, InspectionBackend, LoadCommandSummary};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

const FAT_MAGIC: u32 = 0xCAFE_BABE;
const FAT_HEADER_LEN: usize = 8;
const FAT_ARCH_LEN: usize = 20;
const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const CPU_TYPE_ARM64: u32 = 0x0100_000C;
/// Enough for the fat header of any realistic universal binary.
const FAT_PROBE_LEN: u64 = 4096;

/// Shells out to `otool` and `nm` and parses their text output.
///
/// Every invocation is bounded by `timeout`; a child still running past it is killed.
#[derive(Debug, Clone)]
pub struct ToolsBackend {
    pub otool: PathBuf,
    pub nm: PathBuf,
    pub timeout: Duration,
}

impl Default for ToolsBackend {
    fn default() -> Self {
        Self::from_config(&AnalyzerConfig::default())
    }
}

impl ToolsBackend {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            otool: config.tools.otool.clone().unwrap_or_else(|| resolve_tool("OTOOL_BIN", "otool")),
            nm: config.tools.nm.clone().unwrap_or_else(|| resolve_tool("NM_BIN", "nm")),
            timeout: config.tool_timeout(),
        }
    }
}

impl InspectionBackend for ToolsBackend {
    fn load_commands(&self, binary: &Path) -> Result<LoadCommandSummary, AnalysisError> {
        let listing = run_tool(&self.otool, tool_args(binary, Some("-l")), self.timeout)?;
        Ok(parse_load_command_listing(&listing))
    }

    fn dylib_paths(&self, binary: &Path) -> Result<Vec<String>, AnalysisError> {
        let listing = run_tool(&self.otool, tool_args(binary, Some("-L")), self.timeout)?;
        Ok(parse_dylib_listing(&listing))
    }

    fn symbol_lines(&self, binary: &Path) -> Result<Vec<String>, AnalysisError> {
        let listing = run_tool(&self.nm, tool_args(binary, None), self.timeout)?;
        Ok(first_architecture(&listing)
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &'static str {
        "tools"
    }
}

/// `[-arch <name>] [flag] <binary>`, selecting the same slice of a universal
/// binary that the native backend reads.
fn tool_args(binary: &Path, flag: Option<&str>) -> Vec<OsString> {
    let mut args = Vec::with_capacity(4);
    if let Some(arch) = read_fat_header(binary).as_deref().and_then(preferred_architecture) {
        debug!("selecting {} slice of {}", arch, binary.display());
        args.push(OsString::from("-arch"));
        args.push(OsString::from(arch));
    }
    args.extend(flag.map(OsString::from));
    args.push(binary.as_os_str().to_os_string());
    args
}

fn read_fat_header(binary: &Path) -> Option<Vec<u8>> {
    let mut header = Vec::new();
    File::open(binary).ok()?.take(FAT_PROBE_LEN).read_to_end(&mut header).ok()?;
    Some(header)
}

/// `-arch` name of the preferred slice of a big-endian universal header:
/// arm64, then x86_64.
///
/// `None` for thin images and for universal images with neither slice, in
/// which case the tools print the first architecture.
pub fn preferred_architecture(header: &[u8]) -> Option<&'static str> {
    let read_be = |at: usize| -> Option<u32> {
        let bytes = header.get(at..at + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    };
    if read_be(0)? != FAT_MAGIC {
        return None;
    }
    let count = read_be(4)? as usize;
    let cputypes: Vec<u32> = (0..count)
        .map_while(|i| read_be(FAT_HEADER_LEN + i * FAT_ARCH_LEN))
        .collect();
    if cputypes.contains(&CPU_TYPE_ARM64) {
        Some("arm64")
    } else if cputypes.contains(&CPU_TYPE_X86_64) {
        Some("x86_64")
    } else {
        None
    }
}

fn resolve_tool(env_var: &str, default: &str) -> PathBuf {
    std::env::var_os(env_var).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(default))
}

/// Run `program` with `args`, capturing stdout, killing it after `timeout`.
///
/// The budget also covers draining stdout, which a surviving grandchild can
/// hold open after the tool itself exits. A non-zero exit is a backend error;
/// stdout is decoded lossily.
pub fn run_tool<I, S>(program: &Path, args: I, timeout: Duration) -> Result<String, AnalysisError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.display().to_string();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AnalysisError::Backend(format!("failed to spawn {tool}: {e}")))?;

    // Drain stdout on a separate thread so a chatty child cannot block on a full pipe.
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| AnalysisError::Backend(format!("{tool} stdout was not captured")))?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = tx.send(stdout.read_to_end(&mut buf).map(|_| buf));
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AnalysisError::Timeout { tool, after: timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AnalysisError::Backend(format!("failed to wait for {tool}: {e}")));
            }
        }
    };

    let remaining = timeout.saturating_sub(started.elapsed()).max(POLL_INTERVAL);
    let bytes = match rx.recv_timeout(remaining) {
        Ok(read) => read
            .map_err(|e| AnalysisError::Backend(format!("failed to read {tool} output: {e}")))?,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            return Err(AnalysisError::Timeout { tool, after: timeout })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(AnalysisError::Backend(format!("{tool} output reader panicked")))
        }
    };
    if !status.success() {
        return Err(AnalysisError::Backend(format!("{tool} exited with {status}")));
    }
    debug!("{} produced {} bytes in {:?}", tool, bytes.len(), started.elapsed());
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lines of the first architecture in a listing; universal binaries repeat
/// the whole dump once per `(architecture ...)` / `(for architecture ...)` header.
pub fn first_architecture(listing: &str) -> impl Iterator<Item = &str> {
    let mut headers_seen = 0;
    listing.lines().take_while(move |line| {
        if line.contains("architecture ") && line.trim_end().ends_with(':') {
            headers_seen += 1;
        }
        headers_seen <= 1
    })
}

/// Parse a number printed either as `0x`-prefixed hex or as decimal.
pub fn parse_number(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Nothing,
    CryptId,
    SymbolCount,
    LocalSymbolCount,
}

#[derive(Debug, Default)]
struct PendingSegment {
    name: String,
    size: u64,
    vm_address: u64,
    file_offset: u64,
}

impl PendingSegment {
    fn flush_into(self, segments: &mut Vec<SegmentInfo>) {
        if self.size > 0 {
            segments.push(SegmentInfo::new(self.name, self.size, self.vm_address, self.file_offset));
        }
    }
}

/// Parse `otool -l` output.
///
/// A `segname` line outside a `Section` block starts a new segment record and
/// flushes the previous one if its size is nonzero. `cryptid`, `nsyms`, and
/// `nlocalsym` are only read inside their own load commands.
pub fn parse_load_command_listing(listing: &str) -> LoadCommandSummary {
    let mut summary = LoadCommandSummary::default();
    let mut current: Option<PendingSegment> = None;
    let mut in_section = false;
    let mut awaiting = Awaiting::Nothing;

    for line in first_architecture(listing) {
        let line = line.trim();
        if line.starts_with("Load command") {
            in_section = false;
            awaiting = Awaiting::Nothing;
            continue;
        }
        if line == "Section" {
            in_section = true;
            continue;
        }
        let Some((key, value)) = line.split_once(char::is_whitespace) else { continue };
        let value = value.trim();

        match key {
            "cmd" => {
                awaiting = match value {
                    "LC_ENCRYPTION_INFO" | "LC_ENCRYPTION_INFO_64" => Awaiting::CryptId,
                    "LC_SYMTAB" => Awaiting::SymbolCount,
                    "LC_DYSYMTAB" => Awaiting::LocalSymbolCount,
                    _ => Awaiting::Nothing,
                };
            }
            "segname" if !in_section => {
                if let Some(done) = current.take() {
                    done.flush_into(&mut summary.segments);
                }
                current = Some(PendingSegment { name: value.to_string(), ..Default::default() });
            }
            "vmaddr" | "vmsize" | "fileoff" if !in_section => {
                let (Some(segment), Some(number)) = (current.as_mut(), parse_number(value)) else {
                    continue;
                };
                match key {
                    "vmaddr" => segment.vm_address = number,
                    "vmsize" => segment.size = number,
                    _ => segment.file_offset = number,
                }
            }
            "cryptid" if awaiting == Awaiting::CryptId => {
                if summary.cryptid.is_none() {
                    summary.cryptid = parse_number(value).and_then(|n| u32::try_from(n).ok());
                }
                awaiting = Awaiting::Nothing;
            }
            "nsyms" if awaiting == Awaiting::SymbolCount => {
                summary.symbol_count = parse_number(value).and_then(|n| u32::try_from(n).ok());
                awaiting = Awaiting::Nothing;
            }
            "nlocalsym" if awaiting == Awaiting::LocalSymbolCount => {
                summary.local_symbol_count =
                    parse_number(value).and_then(|n| u32::try_from(n).ok());
                awaiting = Awaiting::Nothing;
            }
            _ => {}
        }
    }

    if let Some(done) = current {
        done.flush_into(&mut summary.segments);
    }
    summary
}

/// Parse `otool -L` output into install names, dropping the header line and
/// the trailing version parenthetical.
pub fn parse_dylib_listing(listing: &str) -> Vec<String> {
    first_architecture(listing)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(|line| strip_version_suffix(line).to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
