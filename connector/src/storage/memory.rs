// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory object store for testing and embedding

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ObjectStore, StorageError, StorageResult};

/// Object store backed by a sorted map; clones share the same objects
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()> {
        if path.is_empty() || path.ends_with('/') {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        self.objects.write().insert(path.to_string(), bytes);
        Ok(())
    }

    fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        self.objects.write().remove(path);
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let mut objects = self.objects.write();
        let doomed: Vec<String> = objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            objects.remove(key);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_overwrites_and_prefix_operations() {
        let store = MemoryObjectStore::new();
        store.put("gs://b/job_1/task_0.avro", vec![1]).unwrap();
        store.put("gs://b/job_1/task_0.avro", vec![2]).unwrap();
        store.put("gs://b/job_1/task_1.avro", vec![3]).unwrap();
        store.put("gs://b/job_10/task_0.avro", vec![4]).unwrap();

        assert_eq!(store.get("gs://b/job_1/task_0.avro").unwrap(), vec![2]);
        assert_eq!(
            store.list("gs://b/job_1/").unwrap(),
            vec!["gs://b/job_1/task_0.avro", "gs://b/job_1/task_1.avro"]
        );

        assert_eq!(store.delete_prefix("gs://b/job_1/").unwrap(), 2);
        assert_eq!(store.list("gs://b/").unwrap(), vec!["gs://b/job_10/task_0.avro"]);
        assert!(matches!(
            store.get("gs://b/job_1/task_1.avro"),
            Err(StorageError::NotFound(_))
        ));
    }
}
