//! Process-local scratch copies of pipeline state.
//!
//! A fork is a deep copy of the pipeline document a caller can mutate
//! without touching disk. Forks live in the server process's memory only:
//! they are explicitly non-durable, vanish when the process exits, and are
//! never a substitute for the file-backed stores or a cross-process
//! coordination channel.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Fork {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub state: Value,
    pub merged: bool,
}

/// In-memory fork table keyed by generated uuid.
#[derive(Debug, Default)]
pub struct ForkMap {
    forks: HashMap<String, Fork>,
}

impl ForkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fork holding a deep copy of `state`.
    pub fn fork(&mut self, name: &str, state: Value) -> String {
        let id = Uuid::new_v4().to_string();
        self.forks.insert(
            id.clone(),
            Fork {
                id: id.clone(),
                name: name.to_string(),
                created_at: Utc::now(),
                state,
                merged: false,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<&Fork> {
        self.forks.get(id)
    }

    /// Shallow-merge object fields into the fork's state. Unknown ids and
    /// non-object states are ignored; forks are scratch space, not a store.
    pub fn update(&mut self, id: &str, updates: Value) {
        let Some(fork) = self.forks.get_mut(id) else {
            return;
        };
        let (Some(target), Some(source)) = (fork.state.as_object_mut(), updates.as_object())
        else {
            return;
        };
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }

    /// Mark a fork consumed and return its final state.
    pub fn take(&mut self, id: &str) -> Option<Value> {
        self.forks.remove(id).map(|fork| fork.state)
    }

    pub fn len(&self) -> usize {
        self.forks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forks.is_empty()
    }
}
