//! User-facing output: styled messages and machine-readable update lists.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

use crate::domain::UpdateCandidate;

pub mod formatter;

pub use formatter::{
    display_error, display_skipped, display_status, display_success, display_summary,
    display_updates, display_warning,
};

/// How `check` prints the updates it found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => bail!("unknown output format '{}': expected text, json or yaml", other),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        })
    }
}

/// Serialize updates for `--output json|yaml`; `None` for text
pub fn render_updates(updates: &[UpdateCandidate], format: OutputFormat) -> Result<Option<String>> {
    Ok(match format {
        OutputFormat::Text => None,
        OutputFormat::Json => Some(serde_json::to_string_pretty(updates)?),
        OutputFormat::Yaml => Some(serde_yaml::to_string(updates)?),
    })
}

/// Print updates in the requested format on stdout
pub fn print_updates(updates: &[UpdateCandidate], format: OutputFormat) -> Result<()> {
    match render_updates(updates, format)? {
        Some(rendered) => println!("{}", rendered),
        None => display_updates(updates),
    }
    Ok(())
}
