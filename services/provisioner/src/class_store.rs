//! Node class lookup.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::NodeClass;

/// Errors returned by a node class store.
#[derive(Debug, Error)]
pub enum NodeClassStoreError {
    #[error("node class {0} not found")]
    NotFound(String),

    #[error("node class store unavailable: {0}")]
    Unavailable(String),
}

impl NodeClassStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Resolves node classes by name.
#[async_trait]
pub trait NodeClassStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<NodeClass, NodeClassStoreError>;
}

/// Node classes held in memory.
#[derive(Debug, Default)]
pub struct InMemoryNodeClassStore {
    classes: RwLock<HashMap<String, NodeClass>>,
}

impl InMemoryNodeClassStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node class.
    pub fn upsert(&self, class: NodeClass) {
        let mut classes = self
            .classes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        classes.insert(class.name.clone(), class);
    }

    pub fn remove(&self, name: &str) -> Option<NodeClass> {
        self.classes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name)
    }
}

impl FromIterator<NodeClass> for InMemoryNodeClassStore {
    fn from_iter<I: IntoIterator<Item = NodeClass>>(iter: I) -> Self {
        let store = Self::new();
        for class in iter {
            store.upsert(class);
        }
        store
    }
}

#[async_trait]
impl NodeClassStore for InMemoryNodeClassStore {
    async fn get(&self, name: &str) -> Result<NodeClass, NodeClassStoreError> {
        self.classes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| NodeClassStoreError::NotFound(name.to_string()))
    }
}
