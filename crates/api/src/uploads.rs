//! Attachment files on disk
//!
//! Files are stored flat in the upload directory under a generated name and
//! served read-only at `/uploads/<name>`.

use std::io;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use helpdesk_shared::{Attachment, NewAttachment};
use uuid::Uuid;

pub const UPLOAD_URL_PREFIX: &str = "/uploads/";

const MAX_EXTENSION_LEN: usize = 10;

/// A file received with a ticket submission
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub bytes: Bytes,
}

/// Keep a short alphanumeric extension from the client's file name
fn extension_of(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn stored_name(original_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    match extension_of(original_name) {
        Some(ext) => format!("{id}.{ext}"),
        None => id,
    }
}

/// Map an attachment URL back to its file, refusing anything outside the
/// upload directory
fn path_for_url(upload_dir: &Path, url: &str) -> Option<PathBuf> {
    let name = url.strip_prefix(UPLOAD_URL_PREFIX)?;
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return None;
    }
    Some(upload_dir.join(name))
}

/// Write uploaded files and describe them for the store. On failure the
/// files already written are removed again.
pub async fn save_uploads(
    upload_dir: &Path,
    files: &[UploadedFile],
) -> io::Result<Vec<NewAttachment>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    tokio::fs::create_dir_all(upload_dir).await?;

    let mut saved = Vec::with_capacity(files.len());
    for file in files {
        let name = stored_name(&file.original_name);
        if let Err(e) = tokio::fs::write(upload_dir.join(&name), &file.bytes).await {
            remove_files(upload_dir, saved.iter().map(|a: &NewAttachment| a.url.as_str())).await;
            return Err(e);
        }
        saved.push(NewAttachment {
            filename: file.original_name.clone(),
            url: format!("{UPLOAD_URL_PREFIX}{name}"),
        });
    }
    Ok(saved)
}

/// Best-effort removal of stored files
pub async fn remove_files<'a>(upload_dir: &Path, urls: impl Iterator<Item = &'a str>) {
    for url in urls {
        let Some(path) = path_for_url(upload_dir, url) else {
            tracing::warn!(url = %url, "Skipping attachment outside upload directory");
            continue;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed attachment file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove attachment file"),
        }
    }
}

pub async fn remove_attachments(upload_dir: &Path, attachments: &[Attachment]) {
    remove_files(upload_dir, attachments.iter().map(|a| a.url.as_str())).await;
}
