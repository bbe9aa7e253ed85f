//! Checksum-skipping, atomic file copies between connections

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::{AsyncRead, BufReader};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::TransferError;
use crate::connection::{Connection, LocalConnection};
use crate::host::LocalHost;
use crate::settings::ConnectSettings;
use crate::template::TemplateRenderer;

/// Size of each read from a transfer source
pub const TRANSFER_CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Source and destination already had the same content
    Unchanged,
    Transferred { bytes: u64 },
}

impl TransferOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, TransferOutcome::Transferred { .. })
    }
}

/// Moves file content between two connections
///
/// Remote-to-remote copies are relayed through the controller. Files whose
/// SHA-256 already matches the destination are not copied at all.
pub struct FileTransfer {
    controller: LocalConnection,
    scratch_dir: Option<String>,
}

impl FileTransfer {
    pub fn new(settings: &ConnectSettings) -> Self {
        Self {
            controller: LocalConnection::new(LocalHost::new(), settings),
            scratch_dir: settings.scratch_dir.clone(),
        }
    }

    /// Upload a controller-side file to `dst`
    pub async fn put(
        &self,
        local_path: &str,
        dst: &dyn Connection,
        dst_path: &str,
    ) -> Result<TransferOutcome, TransferError> {
        self.copy(&self.controller, local_path, dst, dst_path).await
    }

    /// Download a file from `src` to the controller
    pub async fn get(
        &self,
        src: &dyn Connection,
        src_path: &str,
        local_path: &str,
    ) -> Result<TransferOutcome, TransferError> {
        self.copy(src, src_path, &self.controller, local_path).await
    }

    pub async fn copy(
        &self,
        src: &dyn Connection,
        src_path: &str,
        dst: &dyn Connection,
        dst_path: &str,
    ) -> Result<TransferOutcome, TransferError> {
        let stat = src
            .file_stat(src_path)
            .await?
            .ok_or_else(|| TransferError::SourceNotFound {
                host: src.host().addr().to_string(),
                path: src_path.to_string(),
            })?;
        if stat.is_dir() {
            return Err(TransferError::SourceIsDirectory {
                host: src.host().addr().to_string(),
                path: src_path.to_string(),
            });
        }

        let source_sum = src.file_checksum(src_path).await?;
        if self.is_unchanged(source_sum.as_deref(), dst, dst_path).await? {
            debug!("{} on {} is up to date", dst_path, dst.host());
            return Ok(TransferOutcome::Unchanged);
        }

        let mut reader = src.file_read(src_path).await?;
        let bytes = self
            .write_atomic(dst, dst_path, &mut *reader, stat.size)
            .await?;

        info!(
            "Copied {}:{} to {}:{} ({} bytes)",
            src.host().addr(),
            src_path,
            dst.host().addr(),
            dst_path,
            bytes
        );
        Ok(TransferOutcome::Transferred { bytes })
    }

    /// Write in-memory content through the same skip and atomic-write path
    pub async fn put_content(
        &self,
        content: &[u8],
        dst: &dyn Connection,
        dst_path: &str,
    ) -> Result<TransferOutcome, TransferError> {
        let source_sum = format!("{:x}", Sha256::digest(content));
        if self.is_unchanged(Some(&source_sum), dst, dst_path).await? {
            debug!("{} on {} is up to date", dst_path, dst.host());
            return Ok(TransferOutcome::Unchanged);
        }

        let mut reader = content;
        let bytes = self
            .write_atomic(dst, dst_path, &mut reader, content.len() as u64)
            .await?;

        info!("Wrote {}:{} ({} bytes)", dst.host().addr(), dst_path, bytes);
        Ok(TransferOutcome::Transferred { bytes })
    }

    /// Render a template and upload the result
    pub async fn put_template(
        &self,
        renderer: &dyn TemplateRenderer,
        template_path: &str,
        context: &Value,
        dst: &dyn Connection,
        dst_path: &str,
    ) -> Result<TransferOutcome, TransferError> {
        let rendered = renderer.render(template_path, context)?;
        self.put_content(rendered.as_bytes(), dst, dst_path).await
    }

    async fn is_unchanged(
        &self,
        source_sum: Option<&str>,
        dst: &dyn Connection,
        dst_path: &str,
    ) -> Result<bool, TransferError> {
        let Some(source_sum) = source_sum else {
            return Ok(false);
        };
        let dest_sum = dst.file_checksum(dst_path).await?;
        Ok(dest_sum.as_deref() == Some(source_sum))
    }

    /// Stream `source` into a temp file next to `path`, then rename it into
    /// place
    ///
    /// Parent directories are created first. When the byte count differs
    /// from `expected` the temp file is removed and `path` is left untouched.
    pub async fn write_atomic(
        &self,
        dst: &dyn Connection,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
        expected: u64,
    ) -> Result<u64, TransferError> {
        let target = Path::new(path);
        let parent = target
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !p.is_empty());

        if let Some(parent) = &parent {
            dst.create_dir_all(parent).await?;
        }
        if let Some(scratch) = &self.scratch_dir {
            dst.create_dir_all(scratch).await?;
        }

        let temp = self.temp_path(target, parent.as_deref())?;
        debug!("Writing {} through {}", path, temp);

        let mut chunked = BufReader::with_capacity(TRANSFER_CHUNK_SIZE, source);
        let written = match dst.file_write(&temp, &mut chunked).await {
            Ok(written) => written,
            Err(e) => {
                let _ = dst.remove_file(&temp).await;
                return Err(e.into());
            }
        };

        if written != expected {
            dst.remove_file(&temp).await?;
            return Err(TransferError::SizeMismatch {
                path: path.to_string(),
                expected,
                actual: written,
            });
        }

        if let Err(e) = dst.rename(&temp, path).await {
            let _ = dst.remove_file(&temp).await;
            return Err(e.into());
        }
        dst.restore_ownership(path).await?;

        Ok(written)
    }

    /// `.{name}.tmp.{uuid}` in the scratch directory or beside the target
    fn temp_path(&self, target: &Path, parent: Option<&str>) -> Result<String, TransferError> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| TransferError::InvalidDestination {
                path: target.display().to_string(),
            })?;

        let dir = self.scratch_dir.as_deref().or(parent).unwrap_or(".");
        let temp_name = format!(".{}.tmp.{}", name, Uuid::new_v4().simple());
        Ok(Path::new(dir).join(temp_name).to_string_lossy().to_string())
    }
}
