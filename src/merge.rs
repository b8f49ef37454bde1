//! Tar merge (component D)
//!
//! Composes two tar.gz byte streams into one under a deterministic
//! precedence rule: a path present in both wins from `a`. Grounded exactly
//! in the original's `sandbox.utils.merge_tar_gz` — entries from `a` are
//! emitted first and in full, then every entry of `b` whose path was not
//! already seen in `a`.

use std::collections::HashSet;
use std::io::Read;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{AppError, AppResult};

/// Merge `a` over `b`. Either may be absent; an absent input short-circuits
/// to the other (or to `None` if both are absent).
pub fn merge_tar_gz(a: Option<Vec<u8>>, b: Option<Vec<u8>>) -> AppResult<Option<Vec<u8>>> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(a), None) => Ok(Some(a)),
        (None, Some(b)) => Ok(Some(b)),
        (Some(a), Some(b)) => merge_both(&a, &b).map(Some),
    }
}

fn merge_both(a: &[u8], b: &[u8]) -> AppResult<Vec<u8>> {
    let mut archive_a = tar::Archive::new(GzDecoder::new(a));
    let mut archive_b = tar::Archive::new(GzDecoder::new(b));

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut out = tar::Builder::new(encoder);

    let mut a_paths: HashSet<String> = HashSet::new();

    for entry in archive_a.entries().map_err(AppError::from)? {
        let mut entry = entry.map_err(AppError::from)?;
        let path = entry.path().map_err(AppError::from)?.to_string_lossy().into_owned();
        a_paths.insert(path);

        let header = entry.header().clone();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(AppError::from)?;
        out.append(&header, data.as_slice()).map_err(AppError::from)?;
    }

    for entry in archive_b.entries().map_err(AppError::from)? {
        let mut entry = entry.map_err(AppError::from)?;
        let path = entry.path().map_err(AppError::from)?.to_string_lossy().into_owned();
        if a_paths.contains(&path) {
            continue;
        }

        let header = entry.header().clone();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(AppError::from)?;
        out.append(&header, data.as_slice()).map_err(AppError::from)?;
    }

    let encoder = out.into_inner().map_err(AppError::from)?;
    encoder.finish().map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

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

    fn read_entries(tar_gz: &[u8]) -> Vec<(String, String)> {
        let mut archive = tar::Archive::new(GzDecoder::new(tar_gz));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().into_owned();
                let mut content = String::new();
                e.read_to_string(&mut content).unwrap();
                (path, content)
            })
            .collect()
    }

    #[test]
    fn both_empty_returns_none() {
        assert!(merge_tar_gz(None, None).unwrap().is_none());
    }

    #[test]
    fn a_only_short_circuits() {
        let a = make_tar_gz(&[("file.txt", "a")]);
        let merged = merge_tar_gz(Some(a.clone()), None).unwrap().unwrap();
        assert_eq!(merged, a);
    }

    #[test]
    fn b_only_short_circuits() {
        let b = make_tar_gz(&[("file.txt", "b")]);
        let merged = merge_tar_gz(None, Some(b.clone())).unwrap().unwrap();
        assert_eq!(merged, b);
    }

    #[test]
    fn a_wins_on_collision() {
        let a = make_tar_gz(&[("file1.txt", "body")]);
        let b = make_tar_gz(&[("file1.txt", "env"), ("file2.txt", "env")]);

        let merged = merge_tar_gz(Some(a), Some(b)).unwrap().unwrap();
        let entries: std::collections::HashMap<_, _> = read_entries(&merged).into_iter().collect();

        assert_eq!(entries.get("file1.txt").unwrap(), "body");
        assert_eq!(entries.get("file2.txt").unwrap(), "env");
    }
}
