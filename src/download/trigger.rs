//! Delivery of downloaded payloads to the host.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::DownloadError;

/// Highest numeric suffix tried before giving up on a free filename.
const MAX_DUPLICATE_SUFFIX: usize = 1000;

/// Host primitive that receives a payload and returns an opaque identifier.
#[async_trait]
pub trait DownloadTrigger: Send + Sync {
    /// Delivers `payload` under `filename`.
    async fn trigger(&self, payload: Vec<u8>, filename: &str) -> Result<String, DownloadError>;
}

/// Writes payloads into a directory.
///
/// A taken name gets a numeric suffix (`clave.xml`, `clave_1.xml`, ...).
/// The returned id is the written path.
#[derive(Debug, Clone)]
pub struct FileTrigger {
    output_dir: PathBuf,
}

impl FileTrigger {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Writes `payload` into a freshly claimed file, removing the file again if
/// the write fails so no truncated payload keeps the name.
async fn write_claimed<W>(path: &Path, mut writer: W, payload: &[u8]) -> Result<(), DownloadError>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(payload).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    let Err(error) = written else {
        return Ok(());
    };

    drop(writer);
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove partial payload");
    }
    Err(DownloadError::io(path, error))
}

fn candidate_name(filename: &str, suffix: usize) -> String {
    if suffix == 0 {
        return filename.to_string();
    }
    match filename.rfind('.') {
        Some(pos) if pos > 0 => format!("{}_{suffix}{}", &filename[..pos], &filename[pos..]),
        _ => format!("{filename}_{suffix}"),
    }
}

/// Keeps only the final path component so a name can never leave the directory.
fn safe_name(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        "documento.bin".to_string()
    } else {
        name.to_string()
    }
}

#[async_trait]
impl DownloadTrigger for FileTrigger {
    async fn trigger(&self, payload: Vec<u8>, filename: &str) -> Result<String, DownloadError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| DownloadError::io(&self.output_dir, e))?;

        let filename = safe_name(filename);
        for suffix in 0..MAX_DUPLICATE_SUFFIX {
            let path = self.output_dir.join(candidate_name(&filename, suffix));
            // create_new makes the name claim atomic across concurrent jobs.
            let file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(DownloadError::io(&path, e)),
            };

            write_claimed(&path, file, &payload).await?;

            debug!(path = %path.display(), bytes = payload.len(), "payload written");
            return Ok(path.display().to_string());
        }

        let path = self.output_dir.join(&filename);
        Err(DownloadError::io(
            &path,
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free filename after numeric suffixes",
            ),
        ))
    }
}
