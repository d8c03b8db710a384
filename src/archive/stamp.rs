//! Filesystem and EXIF timestamp stamping.
//!
//! Archived files carry their story's posting time twice: in the file
//! modification time (all media) and in the `DateTimeOriginal` EXIF tag
//! (JPEGs only). Photo managers that index on either field then shelve the
//! file under the day it was posted rather than the day it was saved.

use std::fs::{File, FileTimes};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use thiserror::Error;

/// EXIF rewrite failure for one file.
#[derive(Debug, Error)]
#[error("cannot write EXIF timestamp to {path}: {detail}")]
pub struct MetadataWriteError {
    pub path: String,
    pub detail: String,
}

/// Set both the modification and access time of `path` to `timestamp`.
pub fn set_file_times(path: &Path, timestamp: i64) -> io::Result<()> {
    let time = if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        // Pre-epoch timestamps clamp rather than panic.
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(timestamp.unsigned_abs()))
            .unwrap_or(UNIX_EPOCH)
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = File::options().write(true).open(path)?;
    file.set_times(times)
}

fn is_jpeg(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"),
        None => false,
    }
}

fn exif_datetime_string(timestamp: i64) -> String {
    let utc = DateTime::from_timestamp(timestamp, 0).unwrap_or_default();
    utc.with_timezone(&Local)
        .format("%Y:%m:%d %H:%M:%S")
        .to_string()
}

/// Write `timestamp` into the `DateTimeOriginal` tag of a JPEG.
pub fn write_exif_datetime(path: &Path, timestamp: i64) -> Result<(), MetadataWriteError> {
    // Files with no existing EXIF segment start from an empty block.
    let mut metadata = match Metadata::new_from_path(path) {
        Ok(metadata) => metadata,
        Err(_) => Metadata::new(),
    };
    metadata.set_tag(ExifTag::DateTimeOriginal(exif_datetime_string(timestamp)));
    metadata.write_to_file(path).map_err(|e| MetadataWriteError {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    tracing::debug!("Wrote EXIF timestamp to {}", path.display());
    Ok(())
}

/// Stamp `path` with `timestamp`: file times always, EXIF when the file is
/// a JPEG. An EXIF failure is logged and swallowed; the file times alone
/// are enough for most consumers.
pub fn apply_timestamp(path: &Path, timestamp: i64) -> io::Result<()> {
    set_file_times(path, timestamp)?;
    if is_jpeg(path) {
        match write_exif_datetime(path, timestamp) {
            // The EXIF rewrite replaced the file, which reset its times.
            Ok(()) => set_file_times(path, timestamp)?,
            Err(e) => tracing::warn!("{}", e),
        }
    }
    Ok(())
}
