// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Local filesystem object store
//!
//! Maps `scheme://bucket/key` onto `<root>/bucket/key`. Useful for running
//! the staged write path on a single machine.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::{ObjectStore, StorageError, StorageResult};

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Object key with any `scheme://` prefix removed
    fn key(path: &str) -> &str {
        match path.find("://") {
            Some(i) => &path[i + 3..],
            None => path,
        }
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let key = Self::key(path);
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Path prefix as `(scheme prefix, key prefix)`
    fn split_scheme(path: &str) -> (&str, &str) {
        match path.find("://") {
            Some(i) => (&path[..i + 3], &path[i + 3..]),
            None => ("", path),
        }
    }

    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> StorageResult<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::walk(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so readers never observe a half-written object
        let partial = target.with_extension("partial");
        fs::write(&partial, bytes)?;
        fs::rename(&partial, &target)?;
        Ok(())
    }

    fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let target = self.resolve(path)?;
        if !target.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(fs::read(target)?)
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let (scheme, key_prefix) = Self::split_scheme(prefix);
        let mut files = Vec::new();
        Self::walk(&self.root, &mut files)?;
        let mut keys: Vec<String> = files
            .into_iter()
            .filter_map(|file| {
                let relative = file.strip_prefix(&self.root).ok()?;
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                key.starts_with(key_prefix)
                    .then(|| format!("{}{}", scheme, key))
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        let target = self.resolve(path)?;
        match fs::remove_file(target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let objects = self.list(prefix)?;
        for object in &objects {
            self.delete(object)?;
        }
        Ok(objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_store_prefix_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path()).unwrap();

        store.put("gs://bucket/tmp/job_a/task_00000.avro", b"a".to_vec()).unwrap();
        store.put("gs://bucket/tmp/job_a/task_00001.avro", b"b".to_vec()).unwrap();
        store.put("gs://bucket/tmp/job_b/task_00000.avro", b"c".to_vec()).unwrap();

        assert_eq!(
            store.list("gs://bucket/tmp/job_a/").unwrap(),
            vec![
                "gs://bucket/tmp/job_a/task_00000.avro",
                "gs://bucket/tmp/job_a/task_00001.avro"
            ]
        );
        assert_eq!(store.get("gs://bucket/tmp/job_b/task_00000.avro").unwrap(), b"c");

        assert_eq!(store.delete_prefix("gs://bucket/tmp/job_a/").unwrap(), 2);
        assert!(store.list("gs://bucket/tmp/job_a/").unwrap().is_empty());
        assert_eq!(store.list("gs://bucket/").unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path()).unwrap();
        assert!(matches!(
            store.put("gs://bucket/../outside", vec![]),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            store.get("gs://bucket/missing"),
            Err(StorageError::NotFound(_))
        ));
    }
}
