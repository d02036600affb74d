// Copyright (C) 2021-2024 The Ember Developers.
// This file is part of the ember library.

// The ember library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The ember library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the ember library. If not, see <https://www.gnu.org/licenses/>.

use crate::{error::StorageError, objects::Object};

use ember_objects::{ObjectId, ObjectType};

use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;

/// Handle to an open undo scope. Sessions are strictly LIFO: only the
/// top-of-stack session may be committed, undone or merged, and every
/// fallible engine path must resolve its session before returning.
#[derive(Debug)]
pub struct UndoSession {
    serial: u64,
}

impl UndoSession {
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// Inverse actions recorded for one session: created ids, pre-modification
/// values, removed values, and the instance counters to restore.
#[derive(Clone, Debug, Default)]
pub(crate) struct UndoLayer {
    pub serial: u64,
    /// A committed layer stays on the stack as a block-granularity undo
    /// point until trimmed or popped.
    pub committed: bool,
    pub new_ids: IndexSet<ObjectId>,
    pub old_values: IndexMap<ObjectId, Object>,
    pub removed: IndexMap<ObjectId, Object>,
    pub old_next_instance: BTreeMap<ObjectType, u64>,
}

/// The session stack. Mutation capture is routed here by the object store;
/// layer reversal is applied by the store, which owns the object maps.
#[derive(Debug)]
pub(crate) struct UndoStack {
    layers: Vec<UndoLayer>,
    max_depth: usize,
    enabled: bool,
    next_serial: u64,
}

pub(crate) const DEFAULT_MAX_UNDO_DEPTH: usize = 1024;

impl UndoStack {
    pub fn new() -> Self {
        Self { layers: Vec::new(), max_depth: DEFAULT_MAX_UNDO_DEPTH, enabled: true, next_serial: 0 }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth.max(1);
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// The number of in-progress (uncommitted) sessions.
    pub fn open_sessions(&self) -> usize {
        self.layers.iter().filter(|layer| !layer.committed).count()
    }

    pub fn start_session(&mut self) -> UndoSession {
        // Trim irreversible history from the bottom.
        while self.layers.len() >= self.max_depth
            && self.layers.first().map(|layer| layer.committed).unwrap_or(false)
        {
            self.layers.remove(0);
        }

        self.next_serial += 1;
        let serial = self.next_serial;
        self.layers.push(UndoLayer { serial, ..Default::default() });
        UndoSession { serial }
    }

    fn check_top(&self, session: &UndoSession) -> Result<(), StorageError> {
        match self.layers.last() {
            Some(layer) if layer.serial == session.serial && !layer.committed => Ok(()),
            _ => Err(StorageError::SessionNotOnTop),
        }
    }

    /// Makes the session's deltas permanent at this level. The layer stays on
    /// the stack as a block-granularity undo point.
    pub fn commit(&mut self, session: UndoSession) -> Result<(), StorageError> {
        self.check_top(&session)?;
        if let Some(layer) = self.layers.last_mut() {
            layer.committed = true;
        }
        Ok(())
    }

    /// Detaches the top layer for reversal by the store.
    pub fn take_for_undo(&mut self, session: UndoSession) -> Result<UndoLayer, StorageError> {
        self.check_top(&session)?;
        Ok(self.layers.pop().ok_or(StorageError::SessionNotOnTop)?)
    }

    /// Folds the top session's deltas one level up. Dedupes by object id:
    /// the earliest recorded old value survives, a child create stays a
    /// create, and a remove of a parent-created object annihilates. With no
    /// parent the deltas become permanent.
    pub fn merge(&mut self, session: UndoSession) -> Result<(), StorageError> {
        self.check_top(&session)?;
        let child = self.layers.pop().ok_or(StorageError::SessionNotOnTop)?;
        let parent = match self.layers.last_mut() {
            Some(parent) => parent,
            None => return Ok(()),
        };

        for (object_type, next) in child.old_next_instance {
            parent.old_next_instance.entry(object_type).or_insert(next);
        }
        for id in child.new_ids {
            parent.new_ids.insert(id);
        }
        for (id, old) in child.old_values {
            if parent.new_ids.contains(&id) || parent.removed.contains_key(&id) {
                continue;
            }
            parent.old_values.entry(id).or_insert(old);
        }
        for (id, old) in child.removed {
            if parent.new_ids.swap_remove(&id) {
                continue;
            }
            if let Some(parent_old) = parent.old_values.swap_remove(&id) {
                parent.removed.insert(id, parent_old);
            } else {
                parent.removed.insert(id, old);
            }
        }
        Ok(())
    }

    /// Detaches the most recent committed layer for reversal, used to pop a
    /// whole block. Fails if an uncommitted session is still open above it.
    pub fn take_committed_for_undo(&mut self) -> Result<UndoLayer, StorageError> {
        match self.layers.last() {
            Some(layer) if layer.committed => {
                Ok(self.layers.pop().ok_or(StorageError::NoUndoHistory)?)
            }
            Some(_) => Err(StorageError::UndoStackDesync(
                "cannot pop a block with an open session on the stack".into(),
            )),
            None => Err(StorageError::NoUndoHistory),
        }
    }

    fn top_mut(&mut self) -> Result<&mut UndoLayer, StorageError> {
        self.layers.last_mut().ok_or(StorageError::NoActiveSession)
    }

    /// Fails when capture is enabled but no session is open. Checked before
    /// any mutation so a desync cannot leave partial state behind.
    pub fn ensure_capture_ready(&self) -> Result<(), StorageError> {
        if self.enabled && self.layers.is_empty() {
            return Err(StorageError::NoActiveSession);
        }
        Ok(())
    }

    pub fn on_create(&mut self, id: ObjectId, prior_next_instance: u64) -> Result<(), StorageError> {
        if !self.enabled {
            return Ok(());
        }
        let layer = self.top_mut()?;
        layer.old_next_instance.entry(id.object_type).or_insert(prior_next_instance);
        layer.new_ids.insert(id);
        Ok(())
    }

    pub fn on_modify(&mut self, id: ObjectId, old: Object) -> Result<(), StorageError> {
        if !self.enabled {
            return Ok(());
        }
        let layer = self.top_mut()?;
        if layer.new_ids.contains(&id) || layer.old_values.contains_key(&id) {
            return Ok(());
        }
        debug_assert!(!layer.removed.contains_key(&id), "modify of a removed object");
        layer.old_values.insert(id, old);
        Ok(())
    }

    pub fn on_remove(&mut self, id: ObjectId, old: Object) -> Result<(), StorageError> {
        if !self.enabled {
            return Ok(());
        }
        let layer = self.top_mut()?;
        if layer.new_ids.swap_remove(&id) {
            // Created and removed within the same session: net nothing.
            return Ok(());
        }
        if let Some(original) = layer.old_values.swap_remove(&id) {
            layer.removed.insert(id, original);
        } else {
            layer.removed.insert(id, old);
        }
        Ok(())
    }
}
