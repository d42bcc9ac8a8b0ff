//! Working-directory helpers
//!
//! Provides:
//! - **Atomic writes**: downloads are written to a hidden temporary file
//!   next to the target and renamed into place, so a failed transfer never
//!   leaves a truncated file under the real name
//! - **Temp artifact detection**: the temporary names are recognisable so
//!   the lister and the watcher can ignore them
//! - **Local file reads**: modification time and full content for uploads

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use kdrive_core::domain::Filename;

/// Prefix of in-progress download files (hidden on Unix)
const TEMP_PREFIX: &str = ".";

/// Suffix of in-progress download files
const TEMP_SUFFIX: &str = ".kdrive-tmp";

/// Path of the temporary file a download of `name` writes to
pub fn temp_path_for(dir: &Path, name: &Filename) -> PathBuf {
    dir.join(format!("{TEMP_PREFIX}{name}{TEMP_SUFFIX}"))
}

/// Returns true if `name` is an in-progress download artifact
pub fn is_temp_artifact(name: &str) -> bool {
    name.len() > TEMP_PREFIX.len() + TEMP_SUFFIX.len()
        && name.starts_with(TEMP_PREFIX)
        && name.ends_with(TEMP_SUFFIX)
}

/// Writes `data` to `dir/name` via a temporary file and rename
///
/// On failure the temporary file is removed and any existing file under
/// `name` is left untouched.
pub async fn write_atomic(dir: &Path, name: &Filename, data: &[u8]) -> std::io::Result<PathBuf> {
    let target = dir.join(name.as_str());
    let tmp_path = temp_path_for(dir, name);

    debug!(tmp = %tmp_path.display(), "Writing to temporary file");
    if let Err(e) = tokio::fs::write(&tmp_path, data).await {
        discard(&tmp_path).await;
        return Err(e);
    }

    debug!(target = %target.display(), "Renaming temporary file into place");
    if let Err(e) = tokio::fs::rename(&tmp_path, &target).await {
        discard(&tmp_path).await;
        return Err(e);
    }

    Ok(target)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Could not remove temporary file");
        }
    }
}

/// Modification time of `dir/name`
pub async fn modified_time(dir: &Path, name: &Filename) -> std::io::Result<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(dir.join(name.as_str())).await?;
    if !metadata.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{name} is not a regular file"),
        ));
    }
    Ok(DateTime::<Utc>::from(metadata.modified()?))
}

/// Full content of `dir/name`
pub async fn read_file(dir: &Path, name: &Filename) -> std::io::Result<Vec<u8>> {
    tokio::fs::read(dir.join(name.as_str())).await
}
