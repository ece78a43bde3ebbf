use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use crate::utils;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

fn map_io_error(error: std::io::Error, path: &Path) -> AppError {
    AppError::Io(format!("I/O error at path '{}': {}", path.display(), error))
}

fn temp_path_for(fpath: &Path) -> PathBuf {
    let mut name = fpath
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".tmp");
    fpath.with_file_name(name)
}

async fn ensure_parent_dir(fpath: &Path) -> AppResult<()> {
    match fpath.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| map_io_error(e, parent)),
        _ => Ok(()),
    }
}

async fn write_file_async(fpath: &Path, data: &[u8]) -> AppResult<()> {
    let mut file = File::create(fpath)
        .await
        .map_err(|e| map_io_error(e, fpath))?;
    file.write_all(data)
        .await
        .map_err(|e| map_io_error(e, fpath))?;
    file.sync_all().await.map_err(|e| map_io_error(e, fpath))?;
    Ok(())
}

/// Pretty-prints `data` into a sibling temp file and renames it over `fpath`, so the previous
/// contents survive a crash mid-write.
pub async fn save_json<T>(fpath: &Path, data: T, log_ctx: &str) -> AppResult<()>
where
    T: Serialize + Send + Sync + 'static,
{
    let json_bytes = utils::run_blocking(move || {
        serde_json::to_vec_pretty(&data).map_err(AppError::from)
    })
    .await
    .map_err(|e| {
        log(
            LogLevel::Error,
            &format!(
                "Save JSON ({}) FAIL - Serialize/Task Error: {}. File: '{}'",
                log_ctx,
                e,
                fpath.display()
            ),
        );
        e
    })?;

    ensure_parent_dir(fpath).await?;
    let tmp_path = temp_path_for(fpath);

    let written = match write_file_async(&tmp_path, &json_bytes).await {
        Ok(()) => fs::rename(&tmp_path, fpath)
            .await
            .map_err(|e| map_io_error(e, fpath)),
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        log(
            LogLevel::Error,
            &format!(
                "Save JSON ({}) FAIL - Write Error: {}. File: '{}'",
                log_ctx,
                e,
                fpath.display()
            ),
        );
        if fs::try_exists(&tmp_path).await.unwrap_or(false) {
            let _ = fs::remove_file(&tmp_path).await;
        }
        return Err(e);
    }
    Ok(())
}

/// Reads a file's bytes, or `None` when it does not exist.
pub async fn read_if_exists(fpath: &Path) -> AppResult<Option<Vec<u8>>> {
    match fs::read(fpath).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(map_io_error(e, fpath)),
    }
}
