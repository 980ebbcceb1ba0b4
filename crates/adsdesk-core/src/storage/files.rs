use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::AttachedFile;

/// Stores attached documents under `<root>/<sanitized key>.pdf`.
///
/// The path depends only on the dedup key, so attaching the same article
/// twice always lands on the same file.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.pdf", sanitize_key(key)))
    }

    /// Writes `bytes` for `key`, skipping the write when the stored file
    /// already has the same content hash.
    pub fn write(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        source_url: Option<&str>,
    ) -> Result<AttachedFile> {
        let path = self.path_for(key);
        let sha256 = compute_hash(bytes);

        let unchanged = path.is_file() && std::fs::read(&path).map(|b| compute_hash(&b))? == sha256;
        if unchanged {
            tracing::debug!(path = %path.display(), "document already stored with same hash");
        } else {
            std::fs::create_dir_all(&self.root)?;
            let tmp = path.with_extension("pdf.part");
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(&tmp, &path)?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "document written");
        }

        Ok(AttachedFile {
            path: path.to_string_lossy().to_string(),
            sha256,
            size_bytes: bytes.len() as u64,
            content_type: content_type.to_string(),
            source_url: source_url.map(ToOwned::to_owned),
            added_at: Utc::now(),
        })
    }

    /// Moves an attached file to the stable path for `key`.
    pub fn relocate(&self, file: &AttachedFile, key: &str) -> Result<AttachedFile> {
        let target = self.path_for(key);
        if target.as_path() == Path::new(&file.path) {
            return Ok(file.clone());
        }
        std::fs::create_dir_all(&self.root)?;
        std::fs::rename(&file.path, &target)?;
        tracing::debug!(from = %file.path, to = %target.display(), "document moved to new key");

        Ok(AttachedFile {
            path: target.to_string_lossy().to_string(),
            ..file.clone()
        })
    }
}

pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Maps a dedup key to a file stem safe on every platform.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_key("2013ARA&A..51..105C"), "2013ARA_A..51..105C");
        assert_eq!(sanitize_key("ck1:smith:2020:dark"), "ck1_smith_2020_dark");
        assert_eq!(sanitize_key("../etc/passwd"), "_etc_passwd");
    }

    #[test]
    fn path_is_stable_per_key() {
        let store = DocumentStore::new("/lib/files");
        assert_eq!(store.path_for("2020ApJ...900....1S"), store.path_for("2020ApJ...900....1S"));
        assert!(store.path_for("2020ApJ...900....1S").ends_with("2020ApJ...900....1S.pdf"));
    }

    #[test]
    fn write_hashes_content_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path().join("files"));
        let bytes = b"%PDF-1.4 test document";

        let first = store.write("2020ApJ...900....1S", bytes, "application/pdf", None).unwrap();
        let second = store
            .write("2020ApJ...900....1S", bytes, "application/pdf", Some("https://x"))
            .unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(first.sha256, compute_hash(bytes));
        assert_eq!(first.size_bytes, bytes.len() as u64);
        assert_eq!(std::fs::read(&first.path).unwrap(), bytes);

        let files: Vec<_> = std::fs::read_dir(store.root()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn write_replaces_different_content() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());

        let old = store.write("key", b"%PDF-old", "application/pdf", None).unwrap();
        let new = store.write("key", b"%PDF-new", "application/pdf", None).unwrap();
        assert_ne!(old.sha256, new.sha256);
        assert_eq!(std::fs::read(&new.path).unwrap(), b"%PDF-new");
    }

    #[test]
    fn relocate_moves_file_to_new_key() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(dir.path());

        let old = store.write("2013arXiv1301.7095C", b"%PDF-1.5", "application/pdf", None).unwrap();
        let moved = store.relocate(&old, "2013ARA&A..51..105C").unwrap();

        assert_eq!(PathBuf::from(&moved.path), store.path_for("2013ARA&A..51..105C"));
        assert_eq!(moved.sha256, old.sha256);
        assert!(!Path::new(&old.path).exists());
        assert_eq!(std::fs::read(&moved.path).unwrap(), b"%PDF-1.5");

        let again = store.relocate(&moved, "2013ARA&A..51..105C").unwrap();
        assert_eq!(again, moved);
    }
}
