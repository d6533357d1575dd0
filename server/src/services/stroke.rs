//! Stroke service — authoritative replica registry and replicated appends.
//!
//! DESIGN
//! ======
//! The server is an observer like any other: it applies the identical
//! append computation to its own copy of every stroke. That copy backs the
//! moderation queries and the snapshot fallback for strokes whose owners
//! have disconnected.
//!
//! Single-writer rule: only the owning connection may append to, snapshot,
//! or finish a stroke. Phase gating mirrors the client side — strokes spawn
//! and grow only while Playing.

#[cfg(test)]
#[path = "stroke_test.rs"]
mod stroke_test;

use frames::{ErrorCode, Phase};
use strokes::geom::Vec3;
use strokes::mesh::{MeshSnapshot, StrokeMesh};
use strokes::store::{StrokeId, StrokeRecord, StrokeSummary};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum StrokeError {
    #[error("stroke not found: {0}")]
    NotFound(StrokeId),
    #[error("stroke {0} belongs to another brush")]
    NotOwner(StrokeId),
    #[error("stroke {0} is frozen")]
    Frozen(StrokeId),
    #[error("drawing is only allowed while playing (currently {0})")]
    NotPlaying(Phase),
    #[error("inconsistent mesh snapshot for stroke {0}")]
    BadSnapshot(StrokeId),
}

impl ErrorCode for StrokeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_STROKE_NOT_FOUND",
            Self::NotOwner(_) => "E_NOT_OWNER",
            Self::Frozen(_) => "E_STROKE_FROZEN",
            Self::NotPlaying(_) => "E_NOT_PLAYING",
            Self::BadSnapshot(_) => "E_BAD_SNAPSHOT",
        }
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Spawn the networked replica for a stroke. Returns its new identity.
///
/// # Errors
///
/// Rejected outside the Playing phase.
pub async fn spawn(
    state: &AppState,
    owner: Uuid,
    origin: Vec3,
    color: String,
    thickness: f32,
) -> Result<StrokeId, StrokeError> {
    let mut wall = state.wall.write().await;
    let phase = wall.session.phase();
    if !phase.allows_drawing() {
        return Err(StrokeError::NotPlaying(phase));
    }

    let id = StrokeId::new_v4();
    wall.strokes.insert(StrokeRecord {
        id,
        owner,
        color,
        frozen: false,
        hidden: false,
        mesh: StrokeMesh::begin(origin, thickness),
    });
    Ok(id)
}

/// Apply one replicated point append to the server's copy.
///
/// # Errors
///
/// Rejected when the stroke is missing, frozen, owned by another
/// connection, or the session is not Playing.
pub async fn append(
    state: &AppState,
    sender: Uuid,
    id: StrokeId,
    position: Vec3,
    direction: Vec3,
    thickness: f32,
) -> Result<(), StrokeError> {
    let mut wall = state.wall.write().await;
    let phase = wall.session.phase();
    if !phase.allows_drawing() {
        return Err(StrokeError::NotPlaying(phase));
    }

    let record = wall.strokes.get_mut(&id).ok_or(StrokeError::NotFound(id))?;
    if record.owner != sender {
        return Err(StrokeError::NotOwner(id));
    }
    if record.frozen {
        return Err(StrokeError::Frozen(id));
    }

    record.mesh.add_point(position, direction, thickness);
    Ok(())
}

/// Replace the server's copy with the owner's full buffers (the handoff
/// snapshot, or an owner's answer to a resync request).
///
/// # Errors
///
/// Rejected for unknown strokes, non-owners, and inconsistent snapshots.
pub async fn apply_snapshot(
    state: &AppState,
    sender: Uuid,
    id: StrokeId,
    snapshot: MeshSnapshot,
) -> Result<(), StrokeError> {
    let mut wall = state.wall.write().await;
    let record = wall.strokes.get_mut(&id).ok_or(StrokeError::NotFound(id))?;
    if record.owner != sender {
        return Err(StrokeError::NotOwner(id));
    }
    if !record.mesh.apply_snapshot(snapshot) {
        return Err(StrokeError::BadSnapshot(id));
    }
    Ok(())
}

/// Freeze a stroke on press-end. Frozen strokes accept no further appends.
///
/// # Errors
///
/// Rejected for unknown strokes and non-owners.
pub async fn finish(state: &AppState, sender: Uuid, id: StrokeId) -> Result<(), StrokeError> {
    let mut wall = state.wall.write().await;
    let record = wall.strokes.get_mut(&id).ok_or(StrokeError::NotFound(id))?;
    if record.owner != sender {
        return Err(StrokeError::NotOwner(id));
    }
    record.frozen = true;
    Ok(())
}

// =============================================================================
// QUERIES + MODERATION
// =============================================================================

/// Summaries of every replica, for the welcome frame and the admin console.
pub async fn index(state: &AppState) -> Vec<StrokeSummary> {
    state.wall.read().await.strokes.index()
}

/// The owning connection of a stroke, if the stroke exists.
pub async fn owner_of(state: &AppState, id: StrokeId) -> Option<Uuid> {
    state.wall.read().await.strokes.get(&id).map(|r| r.owner)
}

/// The server's own copy of a stroke, for answering resync requests when
/// the owner is gone. Returns the summary alongside the buffers so the
/// requester can reconstruct the record.
pub async fn server_snapshot(
    state: &AppState,
    id: StrokeId,
) -> Option<(StrokeSummary, MeshSnapshot)> {
    let wall = state.wall.read().await;
    let record = wall.strokes.get(&id)?;
    Some((record.summary(), record.mesh.snapshot()))
}

/// Hide or unhide every stroke of one brush. Returns the affected ids.
pub async fn set_hidden(state: &AppState, owner: Uuid, hidden: bool) -> Vec<StrokeId> {
    let mut wall = state.wall.write().await;
    wall.strokes.set_hidden_for_owner(owner, hidden)
}

/// Clear one brush's strokes, or the whole wall.
pub async fn clear(state: &AppState, owner: Option<Uuid>) -> usize {
    let mut wall = state.wall.write().await;
    match owner {
        Some(owner) => wall.strokes.clear_owner(owner).len(),
        None => {
            let count = wall.strokes.len();
            wall.strokes.clear();
            count
        }
    }
}
