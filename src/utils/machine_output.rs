//! Stable envelope for scripting consumers
//!
//! Everything machine-readable goes out in one versioned envelope so
//! downstream scripts can rely on the shape. `ok` is false only when the
//! `errors` list is non-empty; a run where at least one backend succeeded
//! reports its per-backend failures as warnings instead.

use crate::error::Result;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MachineEnvelope<T>
where
    T: Serialize,
{
    pub version: String,
    pub command: String,
    pub ok: bool,
    pub data: T,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub meta: MachineMeta,
}

#[derive(Debug, Serialize)]
pub struct MachineMeta {
    pub generated_at: String,
}

/// Serialize the v1 envelope to the requested format without printing.
pub fn render_v1<T>(
    command: &str,
    data: T,
    warnings: Vec<String>,
    errors: Vec<String>,
    format: &str,
) -> Result<String>
where
    T: Serialize,
{
    let envelope = MachineEnvelope {
        version: "v1".to_string(),
        command: command.to_string(),
        ok: errors.is_empty(),
        data,
        warnings,
        errors,
        meta: MachineMeta {
            generated_at: Utc::now().to_rfc3339(),
        },
    };

    match format {
        "yaml" => Ok(serde_yml::to_string(&envelope)?),
        _ => Ok(serde_json::to_string_pretty(&envelope)?),
    }
}

pub fn emit_v1<T>(
    command: &str,
    data: T,
    warnings: Vec<String>,
    errors: Vec<String>,
    format: &str,
) -> Result<()>
where
    T: Serialize,
{
    println!("{}", render_v1(command, data, warnings, errors, format)?);
    Ok(())
}
