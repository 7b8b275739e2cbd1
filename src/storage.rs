//! Temporary storage for uploaded card images.
//!
//! Uploads are written to a per-request temp directory that is removed when
//! the guard drops, so files are cleaned up on every exit path including
//! early returns and panics during extraction.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// One uploaded image saved to disk for the duration of a request.
pub struct SavedUpload {
    // Held for its Drop: removing the guard removes the directory.
    _dir: tempfile::TempDir,
    path: PathBuf,
    filename: String,
}

impl SavedUpload {
    /// Write the upload under a fresh temp directory. The sanitized original
    /// filename is preserved on disk so extension-based mime detection keeps
    /// working downstream.
    pub fn save(filename: &str, bytes: &[u8]) -> anyhow::Result<Self> {
        let dir = tempfile::Builder::new().prefix("cardscan-").tempdir()?;
        let filename = sanitize_filename(filename);
        let path = dir.path().join(&filename);
        std::fs::write(&path, bytes)?;
        info!(
            "storage: saved upload '{}' ({} bytes) at {}",
            filename,
            bytes.len(),
            path.display()
        );
        Ok(Self {
            _dir: dir,
            path,
            filename,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sanitized original filename.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl Drop for SavedUpload {
    fn drop(&mut self) {
        debug!("storage: releasing temp upload {}", self.path.display());
    }
}

/// Reduce a client-supplied filename to a safe basename: strip any path
/// components and keep a conservative character set.
fn sanitize_filename(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim()
        .trim_start_matches('.');

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "upload.jpg".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_writes_bytes_and_keeps_filename() {
        let upload = SavedUpload::save("card.png", b"not-a-real-png").unwrap();
        assert_eq!(upload.filename(), "card.png");
        assert!(upload.path().exists());
        assert_eq!(std::fs::read(upload.path()).unwrap(), b"not-a-real-png");
    }

    #[test]
    fn temp_file_is_removed_on_drop() {
        let path;
        {
            let upload = SavedUpload::save("card.jpg", b"bytes").unwrap();
            path = upload.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my card (1).jpg"), "my_card__1_.jpg");
        assert_eq!(sanitize_filename(""), "upload.jpg");
        assert_eq!(sanitize_filename("..."), "upload.jpg");
    }
}
