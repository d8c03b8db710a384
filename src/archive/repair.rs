//! Archive-wide timestamp repair.
//!
//! Re-derives every file's timestamp from its name and stamps it back onto
//! the file. Useful after a copy or restore that flattened modification
//! times, since the filename stem is the surviving source of truth.

use std::path::Path;

use anyhow::{Context, Result};

use crate::archive::stamp::apply_timestamp;
use crate::timestamp::StemCodec;

/// Counts from one repair run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairSummary {
    /// Files whose timestamps were re-applied.
    pub repaired: usize,
    /// Files that were left alone, with a warning.
    pub skipped: usize,
}

/// Restamp every media file under `root`, expected to be laid out as one
/// directory per account. Files whose names do not decode are skipped, not
/// fatal; the summary reports both counts.
pub fn repair_archive(root: &Path, codec: &StemCodec) -> Result<RepairSummary> {
    let mut summary = RepairSummary::default();
    let accounts = std::fs::read_dir(root)
        .with_context(|| format!("Cannot read archive root {}", root.display()))?;
    for account in accounts {
        let account = account?;
        if !account.file_type()?.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(account.path())
            .with_context(|| format!("Cannot read {}", account.path().display()))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            repair_file(&entry.path(), codec, &mut summary);
        }
    }
    Ok(summary)
}

fn repair_file(path: &Path, codec: &StemCodec, summary: &mut RepairSummary) {
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem,
        None => {
            tracing::warn!("Skipping {}: no usable file stem", path.display());
            summary.skipped += 1;
            return;
        }
    };
    match codec.decode(stem) {
        Ok(timestamp) => match apply_timestamp(path, timestamp) {
            Ok(()) => {
                tracing::debug!("Restamped {}", path.display());
                summary.repaired += 1;
            }
            Err(e) => {
                tracing::warn!("Could not restamp {}: {}", path.display(), e);
                summary.skipped += 1;
            }
        },
        Err(e) => {
            tracing::warn!("Skipping {}: {}", path.display(), e);
            summary.skipped += 1;
        }
    }
}
