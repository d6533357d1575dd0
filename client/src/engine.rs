//! Wall engine — ownership handoff and frame dispatch for one drawing client.
//!
//! DESIGN
//! ======
//! Pointer handlers and `handle_frame` are pure state transitions returning
//! [`Effect`]s; the host decides what to do with them (send frames over the
//! socket, redraw, update chrome). The engine never talks to a socket.
//!
//! HANDOFF
//! =======
//! Press-start creates a local placeholder mesh immediately and requests a
//! server spawn. Placeholders absorb all move samples while the round-trip
//! is in flight. Spawn confirmations are matched to pending strokes strictly
//! in start (FIFO) order: on confirmation the placeholder's full mesh state
//! is copied onto the networked replica, the brush is retargeted, the
//! placeholder is destroyed, and the snapshot is pushed to the server so
//! every observer starts from identical buffers. A confirmation that never
//! arrives leaves an orphaned placeholder; orphans are swept in bulk on the
//! next welcome, not treated as errors.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::{HashMap, VecDeque};

use frames::{Data, Frame, Phase, Status};
use serde_json::{Value, json};
use strokes::brush::{Brush, DrawState, StrokeTarget};
use strokes::geom::Vec3;
use strokes::mesh::{MeshSnapshot, StrokeMesh};
use strokes::store::{StrokeId, StrokeRecord, StrokeStore, StrokeSummary};
use tracing::warn;
use uuid::Uuid;

/// Outcome of an engine step, for the host to act on.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Send this frame to the server.
    Send(Frame),
    /// The session phase changed; update chrome and input gating.
    PhaseChanged(Phase),
    /// Stroke geometry changed; the host should redraw.
    RenderNeeded,
}

/// A stroke started locally and awaiting its server spawn confirmation.
#[derive(Debug, Clone)]
struct PendingStroke {
    local_id: u64,
    /// Frame ID of the spawn request, for confirmation correlation checks.
    spawn_id: Uuid,
    color: String,
    /// Press-end arrived before the confirmation; finish right after handoff.
    released: bool,
}

/// Per-client drawing engine: brush, placeholders, replicas, and the
/// pending-handoff queue.
pub struct WallEngine {
    client_id: Option<Uuid>,
    phase: Phase,
    brush: Brush,
    placeholders: HashMap<u64, StrokeMesh>,
    next_placeholder: u64,
    pending: VecDeque<PendingStroke>,
    /// Late-join resync: strokes we know of but hold no mesh for yet.
    pending_sync: HashMap<StrokeId, StrokeSummary>,
    store: StrokeStore,
}

impl WallEngine {
    #[must_use]
    pub fn new(brush: Brush) -> Self {
        Self {
            client_id: None,
            phase: Phase::Disconnected,
            brush,
            placeholders: HashMap::new(),
            next_placeholder: 0,
            pending: VecDeque::new(),
            pending_sync: HashMap::new(),
            store: StrokeStore::new(),
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    #[must_use]
    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    /// Brush settings (color, thickness, draw buffer) are host-adjustable.
    pub fn brush_mut(&mut self) -> &mut Brush {
        &mut self.brush
    }

    /// Networked replicas, own and observed.
    #[must_use]
    pub fn store(&self) -> &StrokeStore {
        &self.store
    }

    /// Local placeholder meshes still awaiting handoff, for rendering.
    pub fn placeholders(&self) -> impl Iterator<Item = &StrokeMesh> {
        self.placeholders.values()
    }

    /// Number of strokes awaiting spawn confirmation.
    #[must_use]
    pub fn pending_handoffs(&self) -> usize {
        self.pending.len()
    }

    // --- Pointer input ---

    /// Press-start: begin a stroke on a local placeholder and request the
    /// networked spawn. Ignored outside the Playing phase and while a stroke
    /// is already in progress.
    pub fn pointer_pressed(&mut self, position: Vec3) -> Vec<Effect> {
        if !self.phase.allows_drawing() {
            return Vec::new();
        }
        if matches!(self.brush.state(), DrawState::Drawing { .. }) {
            return Vec::new();
        }

        let local_id = self.next_placeholder;
        self.next_placeholder += 1;

        let mesh = StrokeMesh::begin(position, self.brush.thickness);
        self.placeholders.insert(local_id, mesh);
        self.brush.press(StrokeTarget::Placeholder(local_id), position);

        let mut data = Data::new();
        data.insert("origin".into(), vec3_value(position));
        data.insert("color".into(), json!(self.brush.color));
        data.insert("thickness".into(), json!(self.brush.thickness));
        let frame = Frame::request("stroke:spawn", data);

        self.pending.push_back(PendingStroke {
            local_id,
            spawn_id: frame.id,
            color: self.brush.color.clone(),
            released: false,
        });

        vec![Effect::Send(frame), Effect::RenderNeeded]
    }

    /// Pointer move. Extends the placeholder silently, or the networked
    /// replica with a replicated `stroke:append`.
    pub fn pointer_moved(&mut self, position: Vec3, pressure: f32) -> Vec<Effect> {
        let Some(sample) = self.brush.movement(position, pressure) else {
            return Vec::new();
        };

        match self.brush.target() {
            Some(StrokeTarget::Placeholder(local_id)) => {
                if let Some(mesh) = self.placeholders.get_mut(&local_id) {
                    mesh.add_point(sample.position, sample.direction, sample.thickness);
                }
                vec![Effect::RenderNeeded]
            }
            Some(StrokeTarget::Replica(id)) => {
                if let Some(record) = self.store.get_mut(&id) {
                    record.mesh.add_point(sample.position, sample.direction, sample.thickness);
                }

                let mut data = Data::new();
                data.insert("id".into(), json!(id));
                data.insert("position".into(), vec3_value(sample.position));
                data.insert("direction".into(), vec3_value(sample.direction));
                data.insert("thickness".into(), json!(sample.thickness));
                vec![Effect::Send(Frame::request("stroke:append", data)), Effect::RenderNeeded]
            }
            None => Vec::new(),
        }
    }

    /// Press-end: freeze the stroke. A stroke still on its placeholder is
    /// marked so the finish goes out right after its handoff completes.
    pub fn pointer_released(&mut self) -> Vec<Effect> {
        match self.brush.release() {
            None => Vec::new(),
            Some(StrokeTarget::Placeholder(local_id)) => {
                if let Some(entry) = self.pending.iter_mut().find(|p| p.local_id == local_id) {
                    entry.released = true;
                }
                Vec::new()
            }
            Some(StrokeTarget::Replica(id)) => {
                if let Some(record) = self.store.get_mut(&id) {
                    record.frozen = true;
                }
                let mut data = Data::new();
                data.insert("id".into(), json!(id));
                vec![Effect::Send(Frame::request("stroke:finish", data))]
            }
        }
    }

    /// Signal readiness to start. Only meaningful while Waiting.
    pub fn ready(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Waiting {
            return Vec::new();
        }
        vec![Effect::Send(Frame::request("session:ready", Data::new()))]
    }

    /// The transport dropped. Placeholders are kept and swept on the next
    /// welcome.
    pub fn connection_lost(&mut self) -> Vec<Effect> {
        self.phase = Phase::Disconnected;
        self.brush.reset();
        vec![Effect::PhaseChanged(Phase::Disconnected)]
    }

    // --- Incoming frames ---

    /// Apply one frame from the server.
    pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Effect> {
        if frame.status == Status::Error {
            return self.handle_error(frame);
        }

        match frame.syscall.as_str() {
            "session:connected" => self.on_welcome(frame),
            "session:state" => self.on_session_state(frame),
            "stroke:spawn" if frame.status == Status::Done => self.on_spawn_confirmed(frame),
            "stroke:spawn" => self.on_peer_spawn(frame),
            "stroke:append" => self.on_append(frame),
            "stroke:snapshot" => self.on_snapshot(frame),
            "stroke:snapshot:request" => self.on_snapshot_request(frame),
            "stroke:finish" => self.on_finish(frame),
            "wall:hide" | "wall:show" => self.on_hidden_changed(frame),
            "wall:clear" => self.on_cleared(frame),
            // Presence and reply acks carry nothing the engine tracks.
            _ => Vec::new(),
        }
    }

    /// Welcome: adopt identity and phase, sweep orphans from any previous
    /// connection, and request snapshots for every stroke already on the
    /// wall.
    fn on_welcome(&mut self, frame: &Frame) -> Vec<Effect> {
        self.client_id = data_uuid(&frame.data, "client_id");
        if let Some(color) = frame.data.get("color").and_then(Value::as_str) {
            self.brush.color = color.to_owned();
        }
        self.phase = data_phase(&frame.data).unwrap_or(Phase::Waiting);

        // Orphan sweep: placeholders and pending handoffs from a previous
        // connection can never be confirmed now.
        self.placeholders.clear();
        self.pending.clear();
        self.brush.reset();
        self.store.clear();
        self.pending_sync.clear();

        let mut effects = vec![Effect::PhaseChanged(self.phase), Effect::RenderNeeded];

        let summaries: Vec<StrokeSummary> = frame
            .data
            .get("strokes")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        for summary in summaries {
            let mut data = Data::new();
            data.insert("id".into(), json!(summary.id));
            self.pending_sync.insert(summary.id, summary);
            effects.push(Effect::Send(Frame::request("stroke:snapshot:request", data)));
        }

        effects
    }

    fn on_session_state(&mut self, frame: &Frame) -> Vec<Effect> {
        let Some(phase) = data_phase(&frame.data) else {
            warn!("session:state frame without a phase");
            return Vec::new();
        };

        self.phase = phase;
        let mut effects = vec![Effect::PhaseChanged(phase)];

        // Cycle restart clears every brush's strokes on all peers.
        if phase == Phase::Waiting {
            self.store.clear();
            self.placeholders.clear();
            self.pending.clear();
            self.pending_sync.clear();
            self.brush.reset();
            effects.push(Effect::RenderNeeded);
        }

        effects
    }

    /// Spawn confirmation: complete the ownership handoff for the oldest
    /// pending stroke.
    fn on_spawn_confirmed(&mut self, frame: &Frame) -> Vec<Effect> {
        let Some(entry) = self.pending.pop_front() else {
            warn!(frame_id = %frame.id, "spawn confirmation with no pending stroke");
            return Vec::new();
        };
        if frame.parent_id != Some(entry.spawn_id) {
            // Confirmations are expected back in request order; the queue
            // stays FIFO either way, so only observe the violation.
            warn!(
                expected = %entry.spawn_id,
                got = ?frame.parent_id,
                "spawn confirmation out of request order"
            );
        }

        let Some(id) = data_uuid(&frame.data, "id") else {
            warn!(frame_id = %frame.id, "spawn confirmation without a stroke id");
            return Vec::new();
        };
        let Some(mesh) = self.placeholders.remove(&entry.local_id) else {
            warn!(local_id = entry.local_id, "spawn confirmation for a missing placeholder");
            return Vec::new();
        };

        let snapshot = mesh.snapshot();
        self.store.insert(StrokeRecord {
            id,
            owner: self.client_id.unwrap_or_else(Uuid::nil),
            color: entry.color,
            frozen: entry.released,
            hidden: false,
            mesh,
        });
        self.brush
            .retarget(StrokeTarget::Placeholder(entry.local_id), StrokeTarget::Replica(id));

        let mut data = Data::new();
        data.insert("id".into(), json!(id));
        data.insert("mesh".into(), snapshot_value(&snapshot));
        let mut effects = vec![Effect::Send(Frame::request("stroke:snapshot", data))];

        if entry.released {
            let mut finish = Data::new();
            finish.insert("id".into(), json!(id));
            effects.push(Effect::Send(Frame::request("stroke:finish", finish)));
        }

        effects
    }

    /// Another brush started a stroke: create its replica from the initial
    /// parameters and replay appends as they arrive.
    fn on_peer_spawn(&mut self, frame: &Frame) -> Vec<Effect> {
        let (Some(id), Some(owner), Some(origin)) = (
            data_uuid(&frame.data, "id"),
            data_uuid(&frame.data, "owner"),
            data_vec3(&frame.data, "origin"),
        ) else {
            warn!(frame_id = %frame.id, "malformed stroke:spawn broadcast");
            return Vec::new();
        };
        let color = frame
            .data
            .get("color")
            .and_then(Value::as_str)
            .unwrap_or("#ffffff")
            .to_owned();
        let thickness = data_f32(&frame.data, "thickness").unwrap_or(1.0);

        self.store.insert(StrokeRecord {
            id,
            owner,
            color,
            frozen: false,
            hidden: false,
            mesh: StrokeMesh::begin(origin, thickness),
        });
        vec![Effect::RenderNeeded]
    }

    fn on_append(&mut self, frame: &Frame) -> Vec<Effect> {
        let (Some(id), Some(position), Some(direction), Some(thickness)) = (
            data_uuid(&frame.data, "id"),
            data_vec3(&frame.data, "position"),
            data_vec3(&frame.data, "direction"),
            data_f32(&frame.data, "thickness"),
        ) else {
            warn!(frame_id = %frame.id, "malformed stroke:append");
            return Vec::new();
        };

        let Some(record) = self.store.get_mut(&id) else {
            // An append can outrun the snapshot we asked for; the snapshot
            // will supersede it.
            return Vec::new();
        };
        record.mesh.add_point(position, direction, thickness);
        vec![Effect::RenderNeeded]
    }

    /// Full-buffer snapshot, from handoff fan-out or late-join resync.
    /// Applied atomically: replace, not merge.
    fn on_snapshot(&mut self, frame: &Frame) -> Vec<Effect> {
        let Some(id) = data_uuid(&frame.data, "id") else {
            warn!(frame_id = %frame.id, "stroke:snapshot without id");
            return Vec::new();
        };
        let Some(snapshot) = data_snapshot(&frame.data) else {
            warn!(%id, "stroke:snapshot without a usable mesh");
            return Vec::new();
        };

        if let Some(summary) = self.pending_sync.remove(&id) {
            let Some(mesh) = StrokeMesh::from_snapshot(snapshot) else {
                warn!(%id, "inconsistent snapshot for synced stroke");
                return Vec::new();
            };
            self.store.insert(StrokeRecord {
                id,
                owner: summary.owner,
                color: summary.color,
                frozen: summary.frozen,
                hidden: summary.hidden,
                mesh,
            });
            return vec![Effect::RenderNeeded];
        }

        if let Some(record) = self.store.get_mut(&id) {
            if !record.mesh.apply_snapshot(snapshot) {
                warn!(%id, "inconsistent snapshot rejected");
            }
            return vec![Effect::RenderNeeded];
        }

        // Unknown stroke: the server enriches relayed snapshots with the
        // owning brush, so we can still construct the replica.
        let (Some(owner), Some(mesh)) =
            (data_uuid(&frame.data, "owner"), StrokeMesh::from_snapshot(snapshot))
        else {
            warn!(%id, "snapshot for unknown stroke without owner metadata");
            return Vec::new();
        };
        let color = frame
            .data
            .get("color")
            .and_then(Value::as_str)
            .unwrap_or("#ffffff")
            .to_owned();
        self.store.insert(StrokeRecord {
            id,
            owner,
            color,
            frozen: frame.data.get("frozen").and_then(Value::as_bool).unwrap_or(false),
            hidden: false,
            mesh,
        });
        vec![Effect::RenderNeeded]
    }

    /// The server relayed a late joiner's snapshot request to us, the owner.
    /// Respond once with our current buffers.
    fn on_snapshot_request(&mut self, frame: &Frame) -> Vec<Effect> {
        let (Some(id), Some(requester)) =
            (data_uuid(&frame.data, "id"), data_uuid(&frame.data, "requester"))
        else {
            warn!(frame_id = %frame.id, "malformed stroke:snapshot:request relay");
            return Vec::new();
        };

        let Some(record) = self.store.get(&id) else {
            warn!(%id, "snapshot requested for a stroke we do not hold");
            return Vec::new();
        };
        if Some(record.owner) != self.client_id {
            warn!(%id, "snapshot requested for a stroke we do not own");
            return Vec::new();
        }

        let mut data = Data::new();
        data.insert("id".into(), json!(id));
        data.insert("requester".into(), json!(requester));
        data.insert("mesh".into(), snapshot_value(&record.mesh.snapshot()));
        vec![Effect::Send(Frame::request("stroke:snapshot", data))]
    }

    fn on_finish(&mut self, frame: &Frame) -> Vec<Effect> {
        let Some(id) = data_uuid(&frame.data, "id") else {
            return Vec::new();
        };
        if let Some(record) = self.store.get_mut(&id) {
            record.frozen = true;
        }
        Vec::new()
    }

    fn on_hidden_changed(&mut self, frame: &Frame) -> Vec<Effect> {
        let Some(owner) = data_uuid(&frame.data, "owner") else {
            return Vec::new();
        };
        let hidden = frame.syscall == "wall:hide";
        self.store.set_hidden_for_owner(owner, hidden);
        vec![Effect::RenderNeeded]
    }

    fn on_cleared(&mut self, frame: &Frame) -> Vec<Effect> {
        match data_uuid(&frame.data, "owner") {
            Some(owner) => {
                self.store.clear_owner(owner);
            }
            None => self.store.clear(),
        }
        vec![Effect::RenderNeeded]
    }

    fn handle_error(&mut self, frame: &Frame) -> Vec<Effect> {
        warn!(
            syscall = %frame.syscall,
            code = frame.data.get("code").and_then(serde_json::Value::as_str).unwrap_or("-"),
            message = frame.data.get("message").and_then(serde_json::Value::as_str).unwrap_or("-"),
            "server rejected frame"
        );

        // A failed spawn still consumes its pending entry, or the FIFO
        // pairing of later confirmations would silently shift.
        if frame.syscall == "stroke:spawn" {
            if let Some(entry) = self.pending.pop_front() {
                self.placeholders.remove(&entry.local_id);
                if self.brush.target() == Some(StrokeTarget::Placeholder(entry.local_id)) {
                    self.brush.reset();
                }
                return vec![Effect::RenderNeeded];
            }
        }
        Vec::new()
    }
}

// =============================================================================
// PAYLOAD HELPERS
// =============================================================================

fn vec3_value(v: Vec3) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

fn snapshot_value(snapshot: &MeshSnapshot) -> Value {
    serde_json::to_value(snapshot).unwrap_or(Value::Null)
}

fn data_uuid(data: &Data, key: &str) -> Option<Uuid> {
    data.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

fn data_vec3(data: &Data, key: &str) -> Option<Vec3> {
    data.get(key).cloned().and_then(|v| serde_json::from_value(v).ok())
}

#[allow(clippy::cast_possible_truncation)]
fn data_f32(data: &Data, key: &str) -> Option<f32> {
    data.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

fn data_phase(data: &Data) -> Option<Phase> {
    data.get("phase").and_then(Value::as_str).and_then(Phase::parse)
}

fn data_snapshot(data: &Data) -> Option<MeshSnapshot> {
    data.get("mesh").cloned().and_then(|v| serde_json::from_value(v).ok())
}
