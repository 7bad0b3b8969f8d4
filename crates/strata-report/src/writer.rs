// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Report file output.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::report::StageHashReport;

/// Writes a report as pretty-printed JSON to `path`, creating parent
/// directories as needed.
///
/// # Errors
///
/// Fails if the parent directory cannot be created or the file cannot be
/// written; the error carries the offending path.
pub fn write_report(path: &Path, report: &StageHashReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("serializing stage hash report")?;
    fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
    info!(path = %path.display(), unit_count = report.unit_count, "wrote stage hash report");
    Ok(())
}

/// Reads a report back from `path`.
///
/// The counterpart to [`write_report`] for harnesses that diff a fresh run
/// against a committed baseline.
///
/// # Errors
///
/// Fails if the file cannot be read or does not parse as a report.
pub fn read_report(path: &Path) -> anyhow::Result<StageHashReport> {
    let bytes =
        fs::read(path).with_context(|| format!("reading report from {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing stage hash report {}", path.display()))
}
