//! Wall membership — join/part bookkeeping, fan-out, and targeted sends.
//!
//! ERROR HANDLING
//! ==============
//! Broadcasts are best-effort: a client whose channel is full is skipped
//! rather than blocking the wall. The socket loop notices a dead channel on
//! its next send and disconnects that client.

#[cfg(test)]
#[path = "wall_test.rs"]
mod wall_test;

use frames::{Data, Frame};
use rand::prelude::IndexedRandom;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::state::{AppState, ConnectedClient, Role};

/// Register a connection and build its welcome frame: identity, assigned
/// brush color, current phase, and the stroke index for late-join resync.
/// Peers are notified with a `session:join` broadcast.
pub async fn join(
    state: &AppState,
    client_id: Uuid,
    role: Role,
    tx: mpsc::Sender<Frame>,
) -> Frame {
    let color = state
        .config
        .palette
        .choose(&mut rand::rng())
        .cloned()
        .unwrap_or_else(|| "#f2f2f2".to_owned());

    let (phase, index) = {
        let mut wall = state.wall.write().await;
        wall.clients
            .insert(client_id, ConnectedClient { tx, role, color: color.clone() });
        (wall.session.phase(), wall.strokes.index())
    };

    info!(%client_id, ?role, %phase, "client joined wall");

    let mut join_data = Data::new();
    join_data.insert("client_id".into(), json!(client_id));
    broadcast(state, &Frame::request("session:join", join_data), Some(client_id)).await;

    let mut data = Data::new();
    data.insert("client_id".into(), json!(client_id));
    data.insert("phase".into(), json!(phase.as_str()));
    data.insert("color".into(), json!(color));
    data.insert("strokes".into(), serde_json::to_value(index).unwrap_or_default());
    Frame::request("session:connected", data)
}

/// Drop a connection. Withdraws its ready mark while Waiting and notifies
/// peers with `session:part`. The client's strokes stay on the wall.
pub async fn part(state: &AppState, client_id: Uuid) {
    {
        let mut wall = state.wall.write().await;
        wall.clients.remove(&client_id);
        wall.session.withdraw_ready(client_id);
    }
    info!(%client_id, "client left wall");

    let mut data = Data::new();
    data.insert("client_id".into(), json!(client_id));
    broadcast(state, &Frame::request("session:part", data), None).await;
}

/// Broadcast a frame to all connected clients, optionally excluding one.
pub async fn broadcast(state: &AppState, frame: &Frame, exclude: Option<Uuid>) {
    let wall = state.wall.read().await;
    for (client_id, client) in &wall.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        let _ = client.tx.try_send(frame.clone());
    }
}

/// Send a frame to one connection. Returns `false` if it is not connected.
pub async fn send_to(state: &AppState, client_id: Uuid, frame: &Frame) -> bool {
    let wall = state.wall.read().await;
    let Some(client) = wall.clients.get(&client_id) else {
        return false;
    };
    client.tx.try_send(frame.clone()).is_ok()
}

/// Whether a connection is present and an admin.
pub async fn is_admin(state: &AppState, client_id: Uuid) -> bool {
    let wall = state.wall.read().await;
    wall.clients
        .get(&client_id)
        .is_some_and(|c| c.role == Role::Admin)
}

/// The brush color assigned to a connection at welcome time.
pub async fn assigned_color(state: &AppState, client_id: Uuid) -> Option<String> {
    let wall = state.wall.read().await;
    wall.clients.get(&client_id).map(|c| c.color.clone())
}
