//! Environment store (component C)
//!
//! A flat, filesystem-backed map `env_id -> tar.gz`, keyed by UUID4 strings.
//! Grounded in the original's `sandbox.utils.get_env`/`extract`/`executed_env`
//! and `sandbox.containers.Sandbox.extract_env`. Writes go through a
//! temp-then-rename so readers never observe a torn file.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct EnvironmentStore {
    root: PathBuf,
    ttl: Duration,
}

impl EnvironmentStore {
    pub fn new(root: PathBuf, ttl: Duration) -> AppResult<Self> {
        std::fs::create_dir_all(&root).map_err(AppError::from)?;
        Ok(Self { root, ttl })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.tgz"))
    }

    /// Returns the on-disk path for `id` if it exists.
    pub fn get(&self, id: &str) -> Option<PathBuf> {
        let path = self.path_for(id);
        path.is_file().then_some(path)
    }

    /// Read the raw bytes stored under `id`.
    pub fn read(&self, id: &str) -> AppResult<Vec<u8>> {
        let path = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("unknown environment '{id}'")))?;
        std::fs::read(path).map_err(AppError::from)
    }

    /// Overwrite (or create) the entry for `id` with `bytes`, atomically.
    pub fn put(&self, id: &str, bytes: &[u8]) -> AppResult<()> {
        let dest = self.path_for(id);
        let tmp = self.root.join(format!(".{id}.tmp"));
        std::fs::write(&tmp, bytes).map_err(AppError::from)?;
        std::fs::rename(&tmp, &dest).map_err(AppError::from)?;
        Ok(())
    }

    /// Generate a fresh UUID4 not currently present in the store.
    pub fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    /// Open the tar.gz for `id` and return the bytes of `inner_path`.
    pub fn extract_file(&self, id: &str, inner_path: &str) -> AppResult<Vec<u8>> {
        let bytes = self.read(id)?;
        let decoder = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut archive = tar::Archive::new(decoder);

        for entry in archive.entries().map_err(AppError::from)? {
            let mut entry = entry.map_err(AppError::from)?;
            let path = entry.path().map_err(AppError::from)?;
            if path.as_ref() == Path::new(inner_path) {
                let mut buf = Vec::new();
                std::io::copy(&mut entry, &mut buf).map_err(AppError::from)?;
                return Ok(buf);
            }
        }

        Err(AppError::NotFound(format!(
            "'{inner_path}' not found in environment '{id}'"
        )))
    }

    /// Size, in bytes, of the member at `inner_path` (for HEAD responses).
    pub fn file_size(&self, id: &str, inner_path: &str) -> AppResult<u64> {
        Ok(self.extract_file(id, inner_path)?.len() as u64)
    }

    /// Extract a gzip-tar byte stream into `dest`, refusing any entry whose
    /// path is absolute or contains a `..` component. `dest` must already
    /// exist and be empty; this is the executor's staging step.
    pub fn extract_into(bytes: &[u8], dest: &Path) -> AppResult<()> {
        let decoder = flate2::read::GzDecoder::new(bytes);
        let mut archive = tar::Archive::new(decoder);

        for entry in archive.entries().map_err(AppError::from)? {
            let mut entry = entry.map_err(AppError::from)?;
            let path = entry.path().map_err(AppError::from)?.into_owned();

            if path.is_absolute() || path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
                return Err(AppError::BadRequest(format!(
                    "environment entry '{}' is not a safe relative path",
                    path.display()
                )));
            }

            entry.unpack_in(dest).map_err(AppError::from)?;
        }

        Ok(())
    }

    /// Tar up every entry under `dir` and store the result atomically as `id`.
    pub fn snapshot(&self, dir: &Path, id: &str) -> AppResult<()> {
        let gz = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        builder.append_dir_all(".", dir).map_err(AppError::from)?;
        let gz = builder.into_inner().map_err(AppError::from)?;
        let bytes = gz.finish().map_err(AppError::from)?;
        self.put(id, &bytes)
    }

    /// Delete every entry whose creation time is at least `ttl` old.
    pub fn expire(&self) -> AppResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.root).map_err(AppError::from)? {
            let entry = entry.map_err(AppError::from)?;
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
            {
                continue; // in-flight temp file
            }

            let metadata = entry.metadata().map_err(AppError::from)?;
            // Birth time isn't available on every filesystem; fall back to
            // mtime, which a temp-then-rename write leaves equal to ctime anyway.
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let age = now.duration_since(created).unwrap_or_default();

            if age >= self.ttl {
                if metadata.is_dir() {
                    std::fs::remove_dir_all(&path).map_err(AppError::from)?;
                } else {
                    std::fs::remove_file(&path).map_err(AppError::from)?;
                }
                tracing::info!(path = %path.display(), "environment expired and was deleted");
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;

    fn make_tar_gz(entries: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        let encoder = builder.into_inner().unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn put_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().to_path_buf(), Duration::from_secs(3600)).unwrap();

        let tar = make_tar_gz(&[("a.txt", "hello")]);
        store.put("e1", &tar).unwrap();

        assert_eq!(store.read("e1").unwrap(), tar);
        assert!(store.get("e1").is_some());
    }

    #[test]
    fn read_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().to_path_buf(), Duration::from_secs(3600)).unwrap();
        let err = store.read("nope").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn extract_file_missing_member_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().to_path_buf(), Duration::from_secs(3600)).unwrap();
        store.put("e1", &make_tar_gz(&[("a.txt", "hello")])).unwrap();

        let err = store.extract_file("e1", "missing.txt").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn extract_into_rejects_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        header.set_path("/etc/passwd").unwrap();
        header.set_cksum();
        builder.append(&header, "hi".as_bytes()).unwrap();
        let encoder = builder.into_inner().unwrap();
        let tar_bytes = encoder.finish().unwrap();

        let err = EnvironmentStore::extract_into(&tar_bytes, &dest).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn extract_into_rejects_parent_dir_components() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();

        let tar_bytes = make_tar_gz(&[("../escape.txt", "hi")]);
        let err = EnvironmentStore::extract_into(&tar_bytes, &dest).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn snapshot_then_extract_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join("envs"), Duration::from_secs(3600)).unwrap();

        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("sub").join("file.txt"), "payload").unwrap();

        store.snapshot(&src, "snap1").unwrap();

        let bytes = store.extract_file("snap1", "sub/file.txt").unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[test]
    fn expire_with_zero_ttl_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().to_path_buf(), Duration::ZERO).unwrap();
        store.put("e1", &make_tar_gz(&[("a.txt", "hi")])).unwrap();

        let removed = store.expire().unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("e1").is_none());
    }

    #[test]
    fn expire_with_long_ttl_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().to_path_buf(), Duration::from_secs(24 * 3600)).unwrap();
        store.put("e1", &make_tar_gz(&[("a.txt", "hi")])).unwrap();

        let removed = store.expire().unwrap();
        assert_eq!(removed, 0);
        assert!(store.get("e1").is_some());
    }
}
