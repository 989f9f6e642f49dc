//! Output formatting utilities

use ota_types::VersionInfo;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One line per item
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Print a single item in the specified format
pub fn print_single<T: Serialize>(data: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", serde_json::to_string(data)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}

/// Print bundle listings
pub fn print_versions(versions: &[VersionInfo], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            for v in versions {
                println!("{}", version_line(v));
            }
            Ok(())
        }
        OutputFormat::Json => print_single(&versions, format),
    }
}

pub fn version_line(v: &VersionInfo) -> String {
    format!(
        "{:<12} {:<12} {:<8} {}",
        v.version.as_str(),
        v.name.as_deref().unwrap_or("-"),
        v.status,
        v.downloaded.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("ok {}", message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("error {}", message);
}
