use anyhow::Result;
use serde::Serialize;

use crate::commands::load_config;
use machscope_core::services::analysis::BackendRegistry;

#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub description: String,
}

/// Describe every registered inspection backend, sorted by name.
pub fn backend_infos(registry: &BackendRegistry) -> Vec<BackendInfo> {
    registry
        .names()
        .into_iter()
        .map(|name| {
            let description = match name.as_str() {
                "native" => "Parses Mach-O load commands and symbol table in-process (goblin)"
                    .to_string(),
                "tools" => {
                    "Shells out to otool/nm (OTOOL_BIN / NM_BIN override the tool paths)".to_string()
                }
                other => format!("Backend '{}'", other),
            };
            BackendInfo { name, description }
        })
        .collect()
}

/// List available inspection backends known to this binary.
pub fn list_backends_command(config_path: Option<&str>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let entries = backend_infos(&BackendRegistry::from_config(&config));

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Backends: (none)");
        return Ok(());
    }

    println!("Backends:");
    for entry in entries {
        let marker = if entry.name == config.backend { " (default)" } else { "" };
        println!("- {}{}: {}", entry.name, marker, entry.description);
    }

    Ok(())
}
