//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Broadcast frames from wall peers → forward to client
//!
//! Handler functions are pure business logic — they validate, mutate state,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns:
//! reply to sender, fan-out to observers, and targeted relays.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `session:connected` welcome (identity, phase, color, stroke
//!    index)
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / relay)
//! 4. Close → cleanup, ready-mark withdrawal, `session:part` broadcast

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use frames::{Data, Frame, decode_frame, encode_frame};
use serde_json::{Value, json};
use strokes::geom::Vec3;
use strokes::mesh::MeshSnapshot;
use strokes::store::StrokeId;

use crate::services::{session, stroke, wall};
use crate::state::{AppState, Role};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what — handlers never send frames directly.
enum Outcome {
    /// Broadcast done+data to ALL wall clients including sender.
    /// Sender's copy carries `parent_id` for correlation.
    Broadcast(Data),
    /// Broadcast data to all wall peers EXCLUDING sender. No reply to sender.
    /// Used for the high-frequency replication stream.
    BroadcastExcludeSender(Data),
    /// Send done+data to sender only.
    Reply(Data),
    /// Send empty done to sender only.
    Done,
    /// Reply to sender with one payload, broadcast different data to peers.
    ReplyAndBroadcast { reply: Data, broadcast: Data },
    /// Targeted send to a single connection, as a fresh request frame.
    Relay { to: Uuid, syscall: &'static str, data: Data },
}

#[derive(Debug, thiserror::Error)]
#[error("admin privileges required")]
struct Forbidden;

impl frames::ErrorCode for Forbidden {
    fn error_code(&self) -> &'static str {
        "E_FORBIDDEN"
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    // Closed-LAN installation: the admin console flags itself.
    let role = if params.get("role").map(String::as_str) == Some("admin") {
        Role::Admin
    } else {
        Role::Player
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, role))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, role: Role) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);

    let welcome = wall::join(&state, client_id, role, client_tx).await;
    if send_frame(&mut socket, &welcome).await.is_err() {
        wall::part(&state, client_id).await;
        return;
    }

    info!(%client_id, ?role, "ws: client connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                let sender_frames = match msg {
                    Message::Binary(bytes) => {
                        process_inbound_bytes(&state, client_id, &bytes).await
                    }
                    Message::Text(text) => {
                        process_inbound_text(&state, client_id, &text).await
                    }
                    Message::Close(_) => break,
                    _ => continue,
                };
                for frame in sender_frames {
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break 'conn;
                    }
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    wall::part(&state, client_id).await;
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Decode one inbound binary frame and return frames for the sender.
async fn process_inbound_bytes(state: &AppState, client_id: Uuid, bytes: &[u8]) -> Vec<Frame> {
    match decode_frame(bytes) {
        Ok(req) => process_frame(state, client_id, req).await,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: undecodable binary frame");
            let err = Frame::request("gateway:error", Data::new())
                .with_data("message", format!("invalid frame: {e}"));
            vec![err]
        }
    }
}

/// Parse one inbound JSON text frame (debug transport) and return frames
/// for the sender.
async fn process_inbound_text(state: &AppState, client_id: Uuid, text: &str) -> Vec<Frame> {
    match serde_json::from_str::<Frame>(text) {
        Ok(req) => process_frame(state, client_id, req).await,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new())
                .with_data("message", format!("invalid json: {e}"));
            vec![err]
        }
    }
}

/// Dispatch one inbound frame and apply its outcome. Returns the frames to
/// send back to the sender.
///
/// This keeps the websocket transport concerns separate from frame
/// handling, so tests can exercise the full dispatch path end-to-end.
async fn process_frame(state: &AppState, client_id: Uuid, mut req: Frame) -> Vec<Frame> {
    // Stamp the authenticated connection as `from`.
    req.from = Some(client_id.to_string());

    // The append stream is too chatty to log per-frame.
    if req.syscall != "stroke:append" {
        info!(%client_id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");
    }

    let result = match req.prefix() {
        "session" => handle_session(state, client_id, &req).await,
        "stroke" => handle_stroke(state, client_id, &req).await,
        "wall" => handle_wall(state, client_id, &req).await,
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    // Apply outcome — the dispatch layer owns all outbound logic.
    match result {
        Ok(Outcome::Broadcast(data)) => {
            let sender_frame = req.done_with(data);
            // Peers get a copy without parent_id (they didn't originate the request).
            let mut peer_frame = sender_frame.clone();
            peer_frame.id = Uuid::new_v4();
            peer_frame.parent_id = None;
            wall::broadcast(state, &peer_frame, Some(client_id)).await;
            vec![sender_frame]
        }
        Ok(Outcome::BroadcastExcludeSender(data)) => {
            let frame = Frame::request(&req.syscall, data).with_from(client_id.to_string());
            wall::broadcast(state, &frame, Some(client_id)).await;
            vec![]
        }
        Ok(Outcome::Reply(data)) => {
            vec![req.done_with(data)]
        }
        Ok(Outcome::Done) => {
            vec![req.done()]
        }
        Ok(Outcome::ReplyAndBroadcast { reply, broadcast }) => {
            let sender_frame = req.done_with(reply);
            let notif = Frame::request(&req.syscall, broadcast).with_from(client_id.to_string());
            wall::broadcast(state, &notif, Some(client_id)).await;
            vec![sender_frame]
        }
        Ok(Outcome::Relay { to, syscall, data }) => {
            let frame = Frame::request(syscall, data);
            if !wall::send_to(state, to, &frame).await {
                warn!(%to, syscall, "ws: relay target not connected");
            }
            vec![]
        }
        Err(err_frame) => {
            vec![err_frame]
        }
    }
}

// =============================================================================
// SESSION HANDLERS
// =============================================================================

async fn handle_session(
    state: &AppState,
    client_id: Uuid,
    req: &Frame,
) -> Result<Outcome, Frame> {
    match req.op() {
        "ready" => {
            let transition = {
                let mut wall = state.wall.write().await;
                wall.session.mark_ready(client_id, Instant::now())
            };
            if let Some(t) = transition {
                session::broadcast_transition(state, t).await;
            }
            Ok(Outcome::Done)
        }
        "finish" => {
            require_admin(state, client_id, req).await?;
            let result = {
                let mut wall = state.wall.write().await;
                wall.session.finish()
            };
            match result {
                Ok(t) => {
                    session::broadcast_transition(state, t).await;
                    Ok(Outcome::Done)
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "reset" => {
            require_admin(state, client_id, req).await?;
            let result = {
                let mut wall = state.wall.write().await;
                wall.session.reset()
            };
            match result {
                Ok(t) => {
                    let cleared = stroke::clear(state, None).await;
                    info!(cleared, "session reset: wall cleared");
                    session::broadcast_transition(state, t).await;
                    Ok(Outcome::Done)
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown session op: {op}"))),
    }
}

// =============================================================================
// STROKE HANDLERS
// =============================================================================

async fn handle_stroke(state: &AppState, client_id: Uuid, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "spawn" => {
            let Some(origin) = data_vec3(&req.data, "origin") else {
                return Err(req.error("origin required"));
            };
            let thickness = data_f32(&req.data, "thickness")
                .unwrap_or(strokes::consts::DEFAULT_THICKNESS);
            let color = match req.data.get("color").and_then(Value::as_str) {
                Some(c) => c.to_owned(),
                None => wall::assigned_color(state, client_id)
                    .await
                    .unwrap_or_else(|| "#f2f2f2".to_owned()),
            };

            match stroke::spawn(state, client_id, origin, color.clone(), thickness).await {
                Ok(id) => {
                    let mut reply = Data::new();
                    reply.insert("id".into(), json!(id));

                    let mut broadcast = Data::new();
                    broadcast.insert("id".into(), json!(id));
                    broadcast.insert("owner".into(), json!(client_id));
                    broadcast.insert("origin".into(), req.data.get("origin").cloned().unwrap_or(Value::Null));
                    broadcast.insert("color".into(), json!(color));
                    broadcast.insert("thickness".into(), json!(thickness));

                    Ok(Outcome::ReplyAndBroadcast { reply, broadcast })
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "append" => {
            let (Some(id), Some(position), Some(direction), Some(thickness)) = (
                data_stroke_id(&req.data),
                data_vec3(&req.data, "position"),
                data_vec3(&req.data, "direction"),
                data_f32(&req.data, "thickness"),
            ) else {
                return Err(req.error("id, position, direction, thickness required"));
            };

            match stroke::append(state, client_id, id, position, direction, thickness).await {
                Ok(()) => Ok(Outcome::BroadcastExcludeSender(req.data.clone())),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "snapshot" => {
            let Some(id) = data_stroke_id(&req.data) else {
                return Err(req.error("id required"));
            };
            let Some(snapshot) = data_snapshot(&req.data) else {
                return Err(req.error("mesh required"));
            };

            if let Err(e) = stroke::apply_snapshot(state, client_id, id, snapshot).await {
                return Err(req.error_from(&e));
            }

            // Enrich with the owning brush so receivers that missed the
            // spawn can still construct the replica.
            let mut data = req.data.clone();
            if let Some((summary, _)) = stroke::server_snapshot(state, id).await {
                data.insert("owner".into(), json!(summary.owner));
                data.insert("color".into(), json!(summary.color));
                data.insert("frozen".into(), json!(summary.frozen));
            }

            match data_uuid(&req.data, "requester") {
                Some(requester) => Ok(Outcome::Relay { to: requester, syscall: "stroke:snapshot", data }),
                None => Ok(Outcome::BroadcastExcludeSender(data)),
            }
        }
        "snapshot:request" => {
            let Some(id) = data_stroke_id(&req.data) else {
                return Err(req.error("id required"));
            };
            let Some(owner) = stroke::owner_of(state, id).await else {
                return Err(req.error_from(&stroke::StrokeError::NotFound(id)));
            };

            let owner_connected = state.wall.read().await.clients.contains_key(&owner);
            if owner_connected {
                // Route the request to the replica's owner; its answer comes
                // back through the snapshot handler above.
                let mut data = Data::new();
                data.insert("id".into(), json!(id));
                data.insert("requester".into(), json!(client_id));
                Ok(Outcome::Relay { to: owner, syscall: "stroke:snapshot:request", data })
            } else {
                // Owner is gone: answer from the server's own replica.
                let Some((summary, snapshot)) = stroke::server_snapshot(state, id).await else {
                    return Err(req.error_from(&stroke::StrokeError::NotFound(id)));
                };
                let mut data = Data::new();
                data.insert("id".into(), json!(id));
                data.insert("mesh".into(), serde_json::to_value(snapshot).unwrap_or_default());
                data.insert("owner".into(), json!(summary.owner));
                data.insert("color".into(), json!(summary.color));
                data.insert("frozen".into(), json!(summary.frozen));
                Ok(Outcome::Relay { to: client_id, syscall: "stroke:snapshot", data })
            }
        }
        "finish" => {
            let Some(id) = data_stroke_id(&req.data) else {
                return Err(req.error("id required"));
            };
            match stroke::finish(state, client_id, id).await {
                Ok(()) => Ok(Outcome::BroadcastExcludeSender(req.data.clone())),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown stroke op: {op}"))),
    }
}

// =============================================================================
// WALL HANDLERS (admin console)
// =============================================================================

async fn handle_wall(state: &AppState, client_id: Uuid, req: &Frame) -> Result<Outcome, Frame> {
    require_admin(state, client_id, req).await?;

    match req.op() {
        "strokes" => {
            let index = stroke::index(state).await;
            let mut data = Data::new();
            data.insert("strokes".into(), serde_json::to_value(index).unwrap_or_default());
            Ok(Outcome::Reply(data))
        }
        op @ ("hide" | "show") => {
            let Some(owner) = data_uuid(&req.data, "owner") else {
                return Err(req.error("owner required"));
            };
            let affected = stroke::set_hidden(state, owner, op == "hide").await;
            info!(%owner, count = affected.len(), op, "moderation applied");

            let mut data = Data::new();
            data.insert("owner".into(), json!(owner));
            Ok(Outcome::Broadcast(data))
        }
        "clear" => {
            let owner = data_uuid(&req.data, "owner");
            let cleared = stroke::clear(state, owner).await;
            info!(owner = ?owner, cleared, "wall cleared");

            let mut data = Data::new();
            if let Some(owner) = owner {
                data.insert("owner".into(), json!(owner));
            }
            Ok(Outcome::Broadcast(data))
        }
        op => Err(req.error(format!("unknown wall op: {op}"))),
    }
}

async fn require_admin(state: &AppState, client_id: Uuid, req: &Frame) -> Result<(), Frame> {
    if wall::is_admin(state, client_id).await {
        Ok(())
    } else {
        Err(req.error_from(&Forbidden))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let is_append = frame.syscall == "stroke:append";
    if !is_append {
        if frame.status == frames::Status::Error {
            let code = frame.data.get("code").and_then(Value::as_str).unwrap_or("-");
            let message = frame.data.get("message").and_then(Value::as_str).unwrap_or("-");
            warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
        } else {
            info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
        }
    }

    let bytes = encode_frame(frame);
    socket
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|_| ())
}

fn data_uuid(data: &Data, key: &str) -> Option<Uuid> {
    data.get(key).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

fn data_stroke_id(data: &Data) -> Option<StrokeId> {
    data_uuid(data, "id")
}

fn data_vec3(data: &Data, key: &str) -> Option<Vec3> {
    data.get(key).cloned().and_then(|v| serde_json::from_value(v).ok())
}

#[allow(clippy::cast_possible_truncation)]
fn data_f32(data: &Data, key: &str) -> Option<f32> {
    data.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

fn data_snapshot(data: &Data) -> Option<MeshSnapshot> {
    data.get("mesh").cloned().and_then(|v| serde_json::from_value(v).ok())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
