//! In-memory process registry.
//!
//! The registry owns every `ProcessDefinition`. All access goes through
//! it, and insertion is an atomic check-then-insert under a single lock
//! so two concurrent creations of the same name cannot both succeed.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{DomainError, ProcessDefinition, ProcessId, Result};

#[derive(Default)]
struct Inner {
    by_id: HashMap<ProcessId, ProcessDefinition>,
    name_index: HashMap<String, ProcessId>,
}

#[derive(Default)]
pub struct ProcessRegistry {
    inner: Mutex<Inner>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition, failing if the name is already taken. The
    /// existence check and the insert happen under one lock.
    pub fn insert(&self, definition: ProcessDefinition) -> Result<ProcessId> {
        let mut inner = self.lock();
        if inner.name_index.contains_key(definition.name()) {
            return Err(DomainError::DuplicateProcess(definition.name().to_string()));
        }
        let id = definition.id();
        inner.name_index.insert(definition.name().to_string(), id);
        inner.by_id.insert(id, definition);
        Ok(id)
    }

    /// Insert a batch atomically: either every definition lands or none
    /// does. Used by the config loader for per-file all-or-nothing
    /// semantics.
    pub fn insert_batch(&self, definitions: Vec<ProcessDefinition>) -> Result<Vec<ProcessId>> {
        let mut inner = self.lock();
        let mut seen = std::collections::HashSet::new();
        for def in &definitions {
            if inner.name_index.contains_key(def.name()) || !seen.insert(def.name().to_string()) {
                return Err(DomainError::DuplicateProcess(def.name().to_string()));
            }
        }
        let mut ids = Vec::with_capacity(definitions.len());
        for def in definitions {
            let id = def.id();
            inner.name_index.insert(def.name().to_string(), id);
            inner.by_id.insert(id, def);
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn get(&self, id: ProcessId) -> Option<ProcessDefinition> {
        self.lock().by_id.get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<ProcessDefinition> {
        let inner = self.lock();
        let id = inner.name_index.get(name)?;
        inner.by_id.get(id).cloned()
    }

    pub fn id_of(&self, name: &str) -> Option<ProcessId> {
        self.lock().name_index.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.lock().name_index.contains_key(name)
    }

    /// Snapshot of every definition, used for dependency resolution.
    pub fn snapshot(&self) -> Vec<ProcessDefinition> {
        self.lock().by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_id.is_empty()
    }

    /// Apply a mutation to a definition in place. Only the process's
    /// supervision actor calls this, which keeps runtime state updates
    /// serialized per process.
    pub fn update<F, R>(&self, id: ProcessId, f: F) -> Result<R>
    where
        F: FnOnce(&mut ProcessDefinition) -> R,
    {
        let mut inner = self.lock();
        match inner.by_id.get_mut(&id) {
            Some(def) => Ok(f(def)),
            None => Err(DomainError::ProcessNotFound(id.to_string())),
        }
    }

    pub fn remove(&self, id: ProcessId) -> Result<ProcessDefinition> {
        let mut inner = self.lock();
        let def = inner
            .by_id
            .remove(&id)
            .ok_or_else(|| DomainError::ProcessNotFound(id.to_string()))?;
        inner.name_index.remove(def.name());
        Ok(def)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock holders never panic while holding the guard.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
