//! Staging of remote images on local disk.
//!
//! A download is streamed into a fresh `cold_*` file under the tmp dir, checked
//! against the size ceiling and renamed to carry the url's extension so decoders
//! can rely on it. The returned [`CleanupHandle`] owns the file from the moment
//! it is created: every exit path either releases it explicitly or lets `Drop`
//! remove it.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::{Storage, remove_file, rename_file};
use crate::{AppError, AppResult, ErrType, fetch};

/// Source image downloaded for one pipeline call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl StagedImage {
    /// Extension with its leading dot, empty when the url had none
    pub fn extension(&self) -> String {
        self.path.extension().and_then(|s| s.to_str()).map(|ext| format!(".{ext}")).unwrap_or_default()
    }
}

/// Scoped ownership of a staged file.
///
/// [`CleanupHandle::release`] deletes the file at its current name and reports
/// failures. A handle dropped without being released removes the file on a
/// best-effort basis.
#[derive(Debug)]
pub struct CleanupHandle {
    path: PathBuf,
    armed: bool,
}

impl CleanupHandle {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is still owned by this handle
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Records that the file was already deleted by its user
    pub fn mark_removed(&mut self) {
        self.armed = false;
    }

    pub async fn release(mut self) -> AppResult<()> {
        if !self.armed {
            return Ok(());
        }
        self.armed = false;
        remove_file(&self.path).await
    }

    /// Releases the file and folds a failed removal into `err`
    pub(crate) async fn release_after(self, err: AppError) -> AppError {
        match self.release().await {
            Ok(()) => err,
            Err(cleanup) => err.also(cleanup),
        }
    }

    async fn rename(&mut self, to: PathBuf) -> AppResult<()> {
        rename_file(&self.path, &to).await?;
        self.path = to;
        Ok(())
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::warn!(path = ?self.path, "Temp image released on drop"),
            Err(err) => tracing::warn!(path = ?self.path, err = %err, "Failed to remove temp image on drop"),
        }
    }
}

/// Downloads `url` into the tmp dir.
///
/// `max_size_bytes` of 0 disables the size guard.
pub async fn acquire(
    storage: &Storage,
    fetcher: &fetch::Fetcher,
    url: &str,
    max_size_bytes: u64,
) -> AppResult<(StagedImage, CleanupHandle)> {
    let url = fetch::parse_url(url)?;
    let ext = fetch::url_extension(&url);

    let response = fetcher.get(url).await?;

    let (tmp_path, tmp_file) = storage.new_tmp_file().await?;
    let mut handle = CleanupHandle::new(tmp_path);

    let written = match save_body(response, tmp_file).await {
        Ok(written) => written,
        Err(err) => return Err(handle.release_after(err).await),
    };

    // guard against extremely large images being processed
    if max_size_bytes > 0 && written > max_size_bytes {
        let err = ErrType::TooLarge {
            size: written,
        }
        .msg(format!("Origin image was too big ({written} bytes, max {max_size_bytes})"));
        return Err(handle.release_after(err).await);
    }

    if !ext.is_empty() {
        let mut final_name = handle.path().as_os_str().to_owned();
        final_name.push(&ext);

        let renamed = handle.rename(PathBuf::from(final_name)).await;
        if let Err(err) = renamed {
            return Err(handle.release_after(err).await);
        }
    }

    tracing::info!(path = ?handle.path(), size = written, "Staged remote image");

    let staged = StagedImage {
        path: handle.path().to_path_buf(),
        size_bytes: written,
    };
    Ok((staged, handle))
}

async fn save_body(mut response: reqwest::Response, tmp_file: tokio::fs::File) -> AppResult<u64> {
    let mut buf_writer = tokio::io::BufWriter::new(tmp_file);
    let mut written = 0u64;

    while let Some(chunk) =
        response.chunk().await.map_err(|err| ErrType::FetchError.err(err, "Failed to read next chunk of body"))?
    {
        buf_writer
            .write_all(&chunk)
            .await
            .map_err(|err| ErrType::FsError.err(err, "Failed to write tmp image file"))?;
        written += chunk.len() as u64;
    }

    buf_writer.flush().await.map_err(|err| ErrType::FsError.err(err, "Failed to flush tmp image file"))?;

    Ok(written)
}
