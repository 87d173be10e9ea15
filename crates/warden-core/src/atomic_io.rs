use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

fn temp_path_for(path: &Path) -> Result<(PathBuf, PathBuf)> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("store"),
        std::process::id(),
        current_unix_timestamp_ms()
    );
    let temp_path = parent_dir.join(temp_name);
    Ok((parent_dir, temp_path))
}

/// Writes text using a temp file + rename so readers never observe partial data.
///
/// Only the rename is atomic; a crash mid-write leaves a stray temp file next to
/// the destination and the previous contents intact.
pub async fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
    {
        bail!("destination path '{}' is a directory", path.display());
    }

    let (parent_dir, temp_path) = temp_path_for(path)?;
    tokio::fs::create_dir_all(&parent_dir)
        .await
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    tokio::fs::write(&temp_path, content)
        .await
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    restrict_to_owner(&temp_path, 0o600).await;
    tokio::fs::rename(&temp_path, path).await.with_context(|| {
        format!(
            "failed to rename temporary file {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Creates `dir` (and parents) readable only by the current user where supported.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
    }
    Ok(())
}

async fn restrict_to_owner(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}
