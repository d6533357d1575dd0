use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::state::test_helpers::{connect_client, test_app_state, test_app_state_with};

async fn recv_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("frame receive timed out")
        .expect("frame channel closed unexpectedly")
}

async fn assert_no_frame(rx: &mut mpsc::Receiver<Frame>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no frame"
    );
}

#[tokio::test]
async fn join_welcomes_with_identity_phase_and_color() {
    let state = test_app_state();
    let client_id = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);

    let welcome = join(&state, client_id, Role::Player, tx).await;

    assert_eq!(welcome.syscall, "session:connected");
    assert_eq!(
        welcome.data.get("client_id").and_then(Value::as_str),
        Some(client_id.to_string().as_str())
    );
    assert_eq!(welcome.data.get("phase").and_then(Value::as_str), Some("waiting"));

    let color = welcome.data.get("color").and_then(Value::as_str).expect("color");
    assert!(state.config.palette.iter().any(|c| c.as_str() == color));
    assert!(welcome.data.get("strokes").and_then(Value::as_array).is_some());

    assert!(state.wall.read().await.clients.contains_key(&client_id));
}

#[tokio::test]
async fn join_notifies_existing_peers() {
    let state = test_app_state();
    let peer_id = Uuid::new_v4();
    let mut peer_rx = connect_client(&state, peer_id, Role::Player).await;

    let joiner = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    join(&state, joiner, Role::Player, tx).await;

    let notice = recv_frame(&mut peer_rx).await;
    assert_eq!(notice.syscall, "session:join");
    assert_eq!(
        notice.data.get("client_id").and_then(Value::as_str),
        Some(joiner.to_string().as_str())
    );
}

#[tokio::test]
async fn part_removes_client_and_notifies_peers() {
    let state = test_app_state();
    let leaver = Uuid::new_v4();
    let _leaver_rx = connect_client(&state, leaver, Role::Player).await;
    let peer = Uuid::new_v4();
    let mut peer_rx = connect_client(&state, peer, Role::Player).await;

    part(&state, leaver).await;

    assert!(!state.wall.read().await.clients.contains_key(&leaver));
    let notice = recv_frame(&mut peer_rx).await;
    assert_eq!(notice.syscall, "session:part");
}

#[tokio::test]
async fn part_withdraws_the_ready_mark() {
    let state = test_app_state_with(2, Duration::ZERO, None);
    let leaver = Uuid::new_v4();
    let _leaver_rx = connect_client(&state, leaver, Role::Player).await;

    {
        let mut wall = state.wall.write().await;
        assert!(wall.session.mark_ready(leaver, std::time::Instant::now()).is_none());
        assert_eq!(wall.session.ready_count(), 1);
    }

    part(&state, leaver).await;
    assert_eq!(state.wall.read().await.session.ready_count(), 0);
}

#[tokio::test]
async fn broadcast_reaches_everyone_except_the_excluded() {
    let state = test_app_state();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut rx_a = connect_client(&state, a, Role::Player).await;
    let mut rx_b = connect_client(&state, b, Role::Player).await;

    let frame = Frame::request("session:state", Data::new());
    broadcast(&state, &frame, Some(a)).await;

    let got = recv_frame(&mut rx_b).await;
    assert_eq!(got.syscall, "session:state");
    assert_no_frame(&mut rx_a).await;
}

#[tokio::test]
async fn send_to_reports_missing_connections() {
    let state = test_app_state();
    let a = Uuid::new_v4();
    let mut rx_a = connect_client(&state, a, Role::Player).await;

    let frame = Frame::request("stroke:snapshot", Data::new());
    assert!(send_to(&state, a, &frame).await);
    assert_eq!(recv_frame(&mut rx_a).await.syscall, "stroke:snapshot");

    assert!(!send_to(&state, Uuid::new_v4(), &frame).await);
}

#[tokio::test]
async fn is_admin_checks_the_connection_role() {
    let state = test_app_state();
    let admin = Uuid::new_v4();
    let player = Uuid::new_v4();
    let _admin_rx = connect_client(&state, admin, Role::Admin).await;
    let _player_rx = connect_client(&state, player, Role::Player).await;

    assert!(is_admin(&state, admin).await);
    assert!(!is_admin(&state, player).await);
    assert!(!is_admin(&state, Uuid::new_v4()).await);
}
