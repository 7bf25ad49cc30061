use anyhow::Result;
use clap::{Parser, Subcommand};
use machscope::commands::{analyze_command, list_backends_command};
use machscope::init_logging;

/// Mach-O composition analyzer CLI.
///
/// This CLI is a thin wrapper around `machscope-core` (exposed in code as `machscope_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "machscope",
    version,
    about = "Break a Mach-O executable down into segments, dependencies, and modules",
    long_about = None
)]
struct Cli {
    /// Log level for diagnostics on stderr (trace, debug, info, warn, error, off).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a Mach-O executable extracted from an app bundle.
    ///
    /// Reports the segment table, encryption and strip state, embedded and
    /// system dependencies, package products, and statically linked modules.
    Analyze {
        /// Path to the Mach-O executable.
        #[arg(long)]
        path: String,

        /// Directory holding the app's embedded frameworks.
        /// Defaults to `Frameworks/` next to the binary when present.
        #[arg(long)]
        frameworks_dir: Option<String>,

        /// Inspection backend (`native` or `tools`). Overrides the config file.
        #[arg(long)]
        backend: Option<String>,

        /// Optional analyzer config file (.json, .yaml, .yml).
        #[arg(long)]
        config: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the inspection backends compiled into this binary.
    ListBackends {
        /// Optional analyzer config file (.json, .yaml, .yml).
        #[arg(long)]
        config: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Analyze { path, frameworks_dir, backend, config, json } => analyze_command(
            &path,
            frameworks_dir.as_deref(),
            backend.as_deref(),
            config.as_deref(),
            json,
        )?,
        Command::ListBackends { config, json } => list_backends_command(config.as_deref(), json)?,
    }

    Ok(())
}
