//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use dockconf_config::{ConfigReport, ConfigValue, ProvisionedSecret};
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::context::{CliError, CliResult};

fn to_json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn render_value(name: &str, value: &ConfigValue, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(&json!({ "name": name, "value": value })),
        OutputFormat::Table => Ok(value.to_string()),
    }
}

pub(crate) fn render_report(report: &ConfigReport, format: OutputFormat, color: bool) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Table => Ok(report.render(color).trim_end_matches('\n').to_string()),
    }
}

pub(crate) fn render_provisioned(
    provisioned: &[ProvisionedSecret],
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(provisioned),
        OutputFormat::Table => Ok(provisioned
            .iter()
            .map(|secret| {
                format!(
                    "{:#o} {}:{} {} ({})",
                    secret.mode,
                    secret.uid,
                    secret.gid,
                    secret.path.display(),
                    secret.field
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
    }
}
