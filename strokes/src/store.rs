//! In-memory store of networked stroke replicas.
//!
//! Every process — the server and each client — holds its own store and
//! applies the same updates as they arrive in channel order. A record is
//! mutated only by frames originating from its owning connection; observers
//! never edit a replica independently, so no merge logic exists here.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mesh::StrokeMesh;

/// Stable identity of a networked stroke replica.
pub type StrokeId = Uuid;

/// One networked stroke replica as held by a process.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeRecord {
    pub id: StrokeId,
    /// Connection identity of the brush that owns this stroke.
    pub owner: Uuid,
    pub color: String,
    /// Frozen on press-end; frozen strokes accept no further appends.
    pub frozen: bool,
    /// Hidden by moderation; the mesh is kept so the stroke can be unhidden.
    pub hidden: bool,
    pub mesh: StrokeMesh,
}

/// Lightweight description of a replica, used for the late-join stroke index
/// and the admin listing. Carries no mesh buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeSummary {
    pub id: StrokeId,
    pub owner: Uuid,
    pub color: String,
    pub frozen: bool,
    pub hidden: bool,
    pub samples: u32,
}

impl StrokeRecord {
    #[must_use]
    pub fn summary(&self) -> StrokeSummary {
        StrokeSummary {
            id: self.id,
            owner: self.owner,
            color: self.color.clone(),
            frozen: self.frozen,
            hidden: self.hidden,
            samples: self.mesh.sample_count(),
        }
    }
}

/// Keyed store of stroke replicas.
pub struct StrokeStore {
    strokes: HashMap<StrokeId, StrokeRecord>,
}

impl StrokeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { strokes: HashMap::new() }
    }

    /// Insert or replace a record. If a record with the same `id` already
    /// exists it is overwritten.
    pub fn insert(&mut self, record: StrokeRecord) {
        self.strokes.insert(record.id, record);
    }

    /// Remove a record by id, returning it if it was present.
    pub fn remove(&mut self, id: &StrokeId) -> Option<StrokeRecord> {
        self.strokes.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &StrokeId) -> Option<&StrokeRecord> {
        self.strokes.get(id)
    }

    pub fn get_mut(&mut self, id: &StrokeId) -> Option<&mut StrokeRecord> {
        self.strokes.get_mut(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Drop every record. Used on session reset.
    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    /// All replicas owned by one brush — the moderation hook.
    #[must_use]
    pub fn owned_by(&self, owner: Uuid) -> Vec<&StrokeRecord> {
        let mut records: Vec<&StrokeRecord> =
            self.strokes.values().filter(|r| r.owner == owner).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Remove all replicas owned by one brush. Returns the removed ids.
    pub fn clear_owner(&mut self, owner: Uuid) -> Vec<StrokeId> {
        let mut removed: Vec<StrokeId> = self
            .strokes
            .values()
            .filter(|r| r.owner == owner)
            .map(|r| r.id)
            .collect();
        removed.sort_unstable();
        for id in &removed {
            self.strokes.remove(id);
        }
        removed
    }

    /// Hide or unhide all replicas owned by one brush. Returns the affected ids.
    pub fn set_hidden_for_owner(&mut self, owner: Uuid, hidden: bool) -> Vec<StrokeId> {
        let mut affected = Vec::new();
        for record in self.strokes.values_mut() {
            if record.owner == owner && record.hidden != hidden {
                record.hidden = hidden;
                affected.push(record.id);
            }
        }
        affected.sort_unstable();
        affected
    }

    /// Summaries of every replica, sorted by id for a stable wire order.
    #[must_use]
    pub fn index(&self) -> Vec<StrokeSummary> {
        let mut summaries: Vec<StrokeSummary> =
            self.strokes.values().map(StrokeRecord::summary).collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    /// Iterate all records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &StrokeRecord> {
        self.strokes.values()
    }
}

impl Default for StrokeStore {
    fn default() -> Self {
        Self::new()
    }
}
