use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{Group, GroupSummary, UnitSummary};

/// Header shared by both stages; Stage B rejects anything else.
pub const PIVOT_HEADER: [&str; 4] = [
    "dma",
    "log_revenue_pre",
    "log_revenue_post",
    "log_revenue_diff",
];

const DIFF_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Serialize, Deserialize)]
struct PivotRow {
    dma: String,
    log_revenue_pre: Option<f64>,
    log_revenue_post: Option<f64>,
    log_revenue_diff: Option<f64>,
}

/// Output files for one stage. Each file is staged as a temp file beside
/// its target; nothing becomes visible until `commit`, and dropping the set
/// uncommitted removes every staged file.
#[derive(Default)]
pub struct StagedOutputs {
    staged: Vec<(tempfile::NamedTempFile, PathBuf)>,
}

impl StagedOutputs {
    pub fn stage(&mut self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        if path.is_dir() {
            anyhow::bail!("output path {} is a directory", path.display());
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;

        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to stage a file in {}", dir.display()))?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        self.staged.push((file, path.to_path_buf()));
        Ok(())
    }

    /// Renames every staged file into place. If a rename fails, the files
    /// already moved by this call are removed so the stage leaves no outputs.
    pub fn commit(self) -> anyhow::Result<Vec<PathBuf>> {
        let mut committed: Vec<PathBuf> = Vec::with_capacity(self.staged.len());
        for (file, path) in self.staged {
            if let Err(e) = file.persist(&path) {
                for done in &committed {
                    let _ = std::fs::remove_file(done);
                }
                return Err(anyhow::Error::new(e.error)
                    .context(format!("failed to move output into {}", path.display())));
            }
            tracing::info!(path = %path.display(), "wrote output");
            committed.push(path);
        }
        Ok(committed)
    }
}

pub fn encode_group_table(summary: &GroupSummary) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for unit in &summary.units {
        writer.serialize(PivotRow {
            dma: unit.unit.clone(),
            log_revenue_pre: unit.log_outcome_pre,
            log_revenue_post: unit.log_outcome_post,
            log_revenue_diff: unit.log_outcome_diff,
        })?;
    }
    if summary.units.is_empty() {
        writer.write_record(PIVOT_HEADER)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush table: {}", e.error()))
}

pub fn stage_group_table(
    outputs: &mut StagedOutputs,
    path: &Path,
    summary: &GroupSummary,
) -> anyhow::Result<()> {
    let bytes = encode_group_table(summary)?;
    outputs.stage(path, &bytes)?;
    tracing::debug!(
        group = %summary.group,
        units = summary.units.len(),
        path = %path.display(),
        "staged group table"
    );
    Ok(())
}

pub fn read_group_table(path: &Path, group: Group) -> Result<GroupSummary> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::missing_artifact(path, e))?;
    let summary = decode_group_table(&bytes, group)
        .map_err(|reason| PipelineError::missing_artifact(path, reason))?;
    tracing::info!(
        %group,
        units = summary.units.len(),
        path = %path.display(),
        "loaded group table"
    );
    Ok(summary)
}

/// Parses and validates a pivot table; the error is a human-readable reason.
pub fn decode_group_table(bytes: &[u8], group: Group) -> std::result::Result<GroupSummary, String> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    if headers.iter().ne(PIVOT_HEADER) {
        return Err(format!(
            "unexpected header {:?}, expected {:?}",
            headers.iter().collect::<Vec<_>>(),
            PIVOT_HEADER
        ));
    }

    let mut seen = HashSet::new();
    let mut units = Vec::new();
    for result in reader.deserialize::<PivotRow>() {
        let row = result.map_err(|e| e.to_string())?;
        if !seen.insert(row.dma.clone()) {
            return Err(format!("DMA {} appears more than once", row.dma));
        }

        let unit = UnitSummary::new(row.dma, row.log_revenue_pre, row.log_revenue_post);
        match (unit.log_outcome_diff, row.log_revenue_diff) {
            (None, None) => {}
            (Some(expected), Some(found)) if (expected - found).abs() <= DIFF_TOLERANCE => {}
            (expected, found) => {
                return Err(format!(
                    "DMA {}: log_revenue_diff {:?} does not match post - pre {:?}",
                    unit.unit, found, expected
                ));
            }
        }
        units.push(UnitSummary {
            log_outcome_diff: row.log_revenue_diff,
            ..unit
        });
    }

    if units.is_empty() {
        return Err("table has no rows".to_string());
    }

    Ok(GroupSummary { group, units })
}
