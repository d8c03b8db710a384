//! Collision-safe filename selection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Highest ` (n)` counter tried before giving up on a stem.
const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Pick the first path under `dir` for `stem` + `extension` that does not
/// exist yet: the plain name, then ` (1)`, ` (2)` and so on in order.
///
/// Existing files are never reused or overwritten; a fully saturated stem
/// is an error.
pub fn next_available_path(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    let plain = dir.join(format!("{}.{}", stem, extension));
    if !plain.exists() {
        return Ok(plain);
    }
    for n in 1..=MAX_COLLISION_SUFFIX {
        let candidate = dir.join(format!("{} ({}).{}", stem, n, extension));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    bail!(
        "no free filename for {:?} in {} after {} attempts",
        stem,
        dir.display(),
        MAX_COLLISION_SUFFIX
    );
}

/// Extract the file extension from a media URL, ignoring any query string.
pub fn extension_from_url(media_url: &str) -> Result<String> {
    let url = url::Url::parse(media_url).with_context(|| format!("Invalid media URL {media_url:?}"))?;
    let last_segment = url.path().rsplit('/').next().unwrap_or("");
    if let Some((_, ext)) = last_segment.rsplit_once('.') {
        if !ext.is_empty() {
            return Ok(ext.to_string());
        }
    }
    bail!("media URL {:?} has no file extension", media_url);
}
