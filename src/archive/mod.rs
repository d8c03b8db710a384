//! Local story archive: naming, timestamp stamping and repair.

pub mod naming;
pub mod repair;
pub mod stamp;

pub use naming::{extension_from_url, next_available_path};
pub use repair::{RepairSummary, repair_archive};
pub use stamp::{MetadataWriteError, apply_timestamp};

/// Directory under the working directory (and folder at the remote root)
/// holding one subdirectory per archived account.
pub const STORIES_DIR: &str = "stories";
