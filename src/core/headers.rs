//! Ordered key/value header lists carried by containers

use crate::core::catalog::ObjectId;
use crate::core::error::Result;
use crate::core::store::Store;

/// Insertion-ordered header pairs; duplicate keys are kept
#[derive(Debug, Clone, Default)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
    cursor: usize,
    dirty: bool,
}

impl HeaderList {
    pub(crate) fn load(store: &Store, id: ObjectId) -> Result<Self> {
        Ok(HeaderList {
            entries: store.object(id)?.headers.clone(),
            cursor: 0,
            dirty: false,
        })
    }

    pub(crate) fn add(&mut self, key: &str, value: &str) {
        self.entries.push((key.to_string(), value.to_string()));
        self.dirty = true;
    }

    /// Restart enumeration at the first pair
    pub(crate) fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Next pair of the enumeration started by `begin`
    pub(crate) fn next_pair(&mut self) -> Option<(String, String)> {
        let pair = self.entries.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(pair)
    }

    /// Value of the first pair named `key`
    pub(crate) fn first(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Values of every pair named `key`, in order
    pub(crate) fn all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub(crate) fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub(crate) fn flush(&mut self, store: &mut Store, id: ObjectId) -> Result<()> {
        if self.dirty {
            store.object_mut(id)?.headers = self.entries.clone();
            self.dirty = false;
        }
        Ok(())
    }
}
