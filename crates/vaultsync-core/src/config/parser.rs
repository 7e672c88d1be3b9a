//! TOML parser with helpful error messages

use super::schema::SyncConfig;
use anyhow::{Context, Result};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "vaultsync.toml";

/// Parse vaultsync.toml with detailed error messages
pub fn parse_config(path: &Path) -> Result<SyncConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse vaultsync.toml content from string
pub fn parse_config_str(content: &str) -> Result<SyncConfig> {
    let config: SyncConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Load `explicit` if given, else `<workdir>/vaultsync.toml` if present,
/// else the defaults.
pub fn load_config(explicit: Option<&Path>, workdir: &Path) -> Result<SyncConfig> {
    if let Some(path) = explicit {
        return parse_config(path);
    }

    let candidate = workdir.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        tracing::debug!("Loading config from {}", candidate.display());
        return parse_config(&candidate);
    }

    Ok(SyncConfig::default())
}

/// Enhance TOML parsing errors with helpful context
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.to_string();

    let line_hint = error.span().map(|span| {
        content[..span.start.min(content.len())]
            .matches('\n')
            .count()
            + 1
    });

    match line_hint {
        Some(line_num) => {
            let context = get_line_context(content, line_num);
            anyhow::anyhow!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                context,
                error_msg
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {}", error_msg),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2).min(lines.len());
    let end = (line_num + 1).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
