//! In-memory object store with fault injection, for engine tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::path::Container;
use crate::traits::{Metadata, ObjectRef, ObjectStore};

/// How `delete_object` misbehaves for a given key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteFault {
    /// Report an error and leave the object in place
    Refuse,
    /// Delete the object but still report an error
    Spurious,
}

#[derive(Debug, Clone, Default)]
struct Stored {
    data: Vec<u8>,
    metadata: Metadata,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<Container, BTreeMap<String, Stored>>,
    copy_faults: HashSet<String>,
    delete_faults: HashMap<String, DeleteFault>,
    put_faults: HashSet<String>,
    list_fails: bool,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
    copy_delay: Option<Duration>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed `container` with `keys`; file bodies are the key bytes
    pub(crate) fn with_keys(self, container: &Container, keys: &[&str]) -> Self {
        for key in keys {
            self.insert(container, key, key.as_bytes().to_vec());
        }
        self
    }

    /// Delay every copied key by `delay`, like one request per key
    pub(crate) fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = Some(delay);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn insert(&self, container: &Container, key: &str, data: Vec<u8>) {
        let data = if key.ends_with('/') { Vec::new() } else { data };
        self.state()
            .objects
            .entry(container.clone())
            .or_default()
            .insert(
                key.to_string(),
                Stored {
                    data,
                    metadata: Metadata::new(),
                },
            );
    }

    /// Copies fail when they reach `key`, also in the middle of a folder
    pub(crate) fn fail_copy(&self, key: &str) {
        self.state().copy_faults.insert(key.to_string());
    }

    pub(crate) fn fail_delete(&self, key: &str, fault: DeleteFault) {
        self.state().delete_faults.insert(key.to_string(), fault);
    }

    pub(crate) fn fail_put(&self, key: &str) {
        self.state().put_faults.insert(key.to_string());
    }

    pub(crate) fn fail_list(&self, fail: bool) {
        self.state().list_fails = fail;
    }

    pub(crate) fn keys(&self, container: &Container) -> Vec<String> {
        self.state()
            .objects
            .get(container)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn contains(&self, container: &Container, key: &str) -> bool {
        self.state()
            .objects
            .get(container)
            .is_some_and(|m| m.contains_key(key))
    }

    pub(crate) fn metadata(&self, container: &Container, key: &str) -> Metadata {
        self.state()
            .objects
            .get(container)
            .and_then(|m| m.get(key))
            .map(|s| s.metadata.clone())
            .unwrap_or_default()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

fn matching(objects: &BTreeMap<String, Stored>, key: &str) -> Vec<(String, Stored)> {
    objects
        .iter()
        .filter(|(k, _)| {
            if key.ends_with('/') {
                k.starts_with(key)
            } else {
                k.as_str() == key
            }
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self, container: &Container, prefix: &str) -> Result<Vec<ObjectRef>> {
        let mut state = self.state();
        state.calls.push(format!("list {prefix}"));
        if state.list_fails {
            return Err(Error::Network("listing unavailable".into()));
        }
        Ok(state
            .objects
            .get(container)
            .map(|m| {
                m.iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| ObjectRef::from_key(k.clone(), v.data.len() as u64))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn copy_object(
        &self,
        src: &Container,
        src_key: &str,
        dst: &Container,
        dst_key: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let sources = {
            let mut state = self.state();
            state.calls.push(format!("copy {src_key} -> {dst_key}"));
            state
                .objects
                .get(src)
                .map(|m| matching(m, src_key))
                .unwrap_or_default()
        };
        if sources.is_empty() {
            return Err(Error::NotFound(src_key.to_string()));
        }

        // One key at a time, so an interrupted folder copy leaves partial state
        for (key, mut stored) in sources {
            if let Some(delay) = self.copy_delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state();
            if state.copy_faults.contains(&key) {
                return Err(Error::Network(format!("copy of {key} failed")));
            }
            if !metadata.is_empty() {
                stored.metadata = metadata.clone();
            }
            let suffix = &key[src_key.len()..];
            state
                .objects
                .entry(dst.clone())
                .or_default()
                .insert(format!("{dst_key}{suffix}"), stored);
        }
        Ok(())
    }

    async fn get_object(&self, container: &Container, key: &str) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.calls.push(format!("get {key}"));
        state
            .objects
            .get(container)
            .and_then(|m| m.get(key))
            .map(|s| s.data.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn head_metadata(&self, container: &Container, key: &str) -> Result<Metadata> {
        let mut state = self.state();
        state.calls.push(format!("head {key}"));
        state
            .objects
            .get(container)
            .and_then(|m| m.get(key))
            .map(|s| s.metadata.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn delete_object(&self, container: &Container, key: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete {key}"));
        let fault = state.delete_faults.get(key).copied();
        if fault == Some(DeleteFault::Refuse) {
            return Err(Error::Auth(format!("delete of {key} denied")));
        }
        if let Some(objects) = state.objects.get_mut(container) {
            if key.ends_with('/') {
                objects.retain(|k, _| !k.starts_with(key));
            } else {
                objects.remove(key);
            }
        }
        match fault {
            Some(DeleteFault::Spurious) => Err(Error::Network("connection reset".into())),
            _ => Ok(()),
        }
    }

    async fn put_object(
        &self,
        container: &Container,
        key: &str,
        data: Vec<u8>,
    ) -> Result<ObjectRef> {
        let mut state = self.state();
        state.calls.push(format!("put {key}"));
        if state.put_faults.contains(key) {
            return Err(Error::Network(format!("upload of {key} failed")));
        }
        let size = data.len() as u64;
        state.objects.entry(container.clone()).or_default().insert(
            key.to_string(),
            Stored {
                data,
                metadata: Metadata::new(),
            },
        );
        Ok(ObjectRef::from_key(key, size))
    }
}
