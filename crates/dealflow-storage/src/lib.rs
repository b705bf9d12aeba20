//! Content-hashed, atomically written output files for extraction snapshots.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredOutput {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    /// The file already held exactly these bytes, nothing was written.
    pub unchanged: bool,
}

#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Write `bytes` to `relative_path` under the root via a temp file and rename,
    /// so readers never observe a half-written snapshot.
    pub fn write_bytes(
        &self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> anyhow::Result<StoredOutput> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.root.join(&relative_path);
        let content_hash = Self::sha256_hex(bytes);

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;

        if absolute_path.exists() {
            let existing = fs::read(&absolute_path)
                .with_context(|| format!("reading existing output {}", absolute_path.display()))?;
            if Self::sha256_hex(&existing) == content_hash {
                debug!(path = %absolute_path.display(), "output unchanged");
                return Ok(StoredOutput {
                    content_hash,
                    relative_path,
                    absolute_path,
                    byte_size: bytes.len(),
                    unchanged: true,
                });
            }
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let write_result = (|| -> anyhow::Result<()> {
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&temp_path)
                .with_context(|| format!("opening temp output file {}", temp_path.display()))?;
            file.write_all(bytes)
                .with_context(|| format!("writing temp output file {}", temp_path.display()))?;
            file.sync_all()
                .with_context(|| format!("syncing temp output file {}", temp_path.display()))?;
            fs::rename(&temp_path, &absolute_path).with_context(|| {
                format!(
                    "atomically renaming temp output {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            })
        })();

        if let Err(err) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(err);
        }

        debug!(path = %absolute_path.display(), bytes = bytes.len(), "output written");
        Ok(StoredOutput {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            unchanged: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn output_hashing_is_stable() {
        let hash = OutputStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn rewriting_same_bytes_is_reported_unchanged() {
        let dir = tempdir().expect("tempdir");
        let store = OutputStore::new(dir.path());

        let first = store
            .write_bytes("run-1/companies.json", b"[]")
            .expect("first write");
        let second = store
            .write_bytes("run-1/companies.json", b"[]")
            .expect("second write");

        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(fs::read(&first.absolute_path).unwrap(), b"[]");
    }

    #[test]
    fn changed_bytes_replace_the_file_without_leftovers() {
        let dir = tempdir().expect("tempdir");
        let store = OutputStore::new(dir.path());

        store.write_bytes("out.json", b"[1]").expect("first write");
        let second = store.write_bytes("out.json", b"[1,2]").expect("second write");

        assert!(!second.unchanged);
        assert_eq!(fs::read(dir.path().join("out.json")).unwrap(), b"[1,2]");
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
