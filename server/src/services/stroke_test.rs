use std::time::Instant;

use strokes::geom::Vec3;
use strokes::mesh::StrokeMesh;
use uuid::Uuid;

use super::*;
use crate::state::test_helpers::{test_app_state, test_app_state_with};

fn v(x: f32, y: f32) -> Vec3 {
    Vec3::new(x, y, 0.0)
}

/// App state advanced into the Playing phase.
async fn playing_state() -> AppState {
    let state = test_app_state_with(1, std::time::Duration::ZERO, None);
    {
        let mut wall = state.wall.write().await;
        let now = Instant::now();
        wall.session.mark_ready(Uuid::new_v4(), now).expect("quorum of one");
        wall.session.tick(now).expect("instant countdown");
    }
    state
}

#[tokio::test]
async fn spawn_is_rejected_outside_playing() {
    let state = test_app_state();
    let err = spawn(&state, Uuid::new_v4(), v(0.0, 0.0), "#fff".into(), 1.0)
        .await
        .expect_err("waiting rejects spawn");
    assert!(matches!(err, StrokeError::NotPlaying(frames::Phase::Waiting)));
}

#[tokio::test]
async fn spawn_registers_a_degenerate_replica() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();

    let id = spawn(&state, owner, v(1.0, 2.0), "#ff5533".into(), 2.0)
        .await
        .expect("spawn");

    let wall = state.wall.read().await;
    let record = wall.strokes.get(&id).expect("record");
    assert_eq!(record.owner, owner);
    assert_eq!(record.mesh, StrokeMesh::begin(v(1.0, 2.0), 2.0));
    assert!(!record.frozen);
}

#[tokio::test]
async fn append_applies_the_identical_computation() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#fff".into(), 2.0).await.expect("spawn");

    append(&state, owner, id, v(10.0, 0.0), v(1.0, 0.0), 2.0).await.expect("append");
    append(&state, owner, id, v(10.0, 5.0), v(0.0, 5.0), 2.0).await.expect("append");

    let mut expected = StrokeMesh::begin(v(0.0, 0.0), 2.0);
    expected.add_point(v(10.0, 0.0), v(1.0, 0.0), 2.0);
    expected.add_point(v(10.0, 5.0), v(0.0, 5.0), 2.0);

    let wall = state.wall.read().await;
    assert_eq!(wall.strokes.get(&id).expect("record").mesh, expected);
}

#[tokio::test]
async fn append_by_another_connection_is_rejected() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");

    let err = append(&state, Uuid::new_v4(), id, v(1.0, 0.0), v(1.0, 0.0), 1.0)
        .await
        .expect_err("single-writer rule");
    assert!(matches!(err, StrokeError::NotOwner(_)));
}

#[tokio::test]
async fn append_to_unknown_stroke_is_rejected() {
    let state = playing_state().await;
    let err = append(&state, Uuid::new_v4(), Uuid::new_v4(), v(1.0, 0.0), v(1.0, 0.0), 1.0)
        .await
        .expect_err("unknown stroke");
    assert!(matches!(err, StrokeError::NotFound(_)));
}

#[tokio::test]
async fn frozen_stroke_rejects_appends() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");

    finish(&state, owner, id).await.expect("finish");
    let err = append(&state, owner, id, v(1.0, 0.0), v(1.0, 0.0), 1.0)
        .await
        .expect_err("frozen");
    assert!(matches!(err, StrokeError::Frozen(_)));
}

#[tokio::test]
async fn finish_by_non_owner_is_rejected() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");

    let err = finish(&state, Uuid::new_v4(), id).await.expect_err("single-writer rule");
    assert!(matches!(err, StrokeError::NotOwner(_)));
}

#[tokio::test]
async fn snapshot_replaces_the_server_copy() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");

    // The owner's placeholder accumulated points before the handoff.
    let mut placeholder = StrokeMesh::begin(v(0.0, 0.0), 1.0);
    placeholder.add_point(v(1.0, 0.0), v(1.0, 0.0), 1.0);
    placeholder.add_point(v(2.0, 1.0), v(1.0, 1.0), 1.0);

    apply_snapshot(&state, owner, id, placeholder.snapshot()).await.expect("snapshot");

    let wall = state.wall.read().await;
    assert_eq!(wall.strokes.get(&id).expect("record").mesh, placeholder);
}

#[tokio::test]
async fn inconsistent_snapshot_is_rejected() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");

    let mut bad = StrokeMesh::begin(v(0.0, 0.0), 1.0).snapshot();
    bad.vertices.pop();

    let err = apply_snapshot(&state, owner, id, bad).await.expect_err("inconsistent");
    assert!(matches!(err, StrokeError::BadSnapshot(_)));
}

#[tokio::test]
async fn server_snapshot_backs_departed_owners() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#abc123".into(), 1.0).await.expect("spawn");
    append(&state, owner, id, v(1.0, 0.0), v(1.0, 0.0), 1.0).await.expect("append");

    let (summary, snapshot) = server_snapshot(&state, id).await.expect("held");
    assert_eq!(summary.owner, owner);
    assert_eq!(summary.color, "#abc123");
    assert_eq!(snapshot.samples, 2);

    assert!(server_snapshot(&state, Uuid::new_v4()).await.is_none());
}

#[tokio::test]
async fn moderation_hides_and_clears_by_owner() {
    let state = playing_state().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    spawn(&state, alice, v(0.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");
    spawn(&state, alice, v(1.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");
    spawn(&state, bob, v(2.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");

    assert_eq!(set_hidden(&state, alice, true).await.len(), 2);
    assert_eq!(index(&state).await.iter().filter(|s| s.hidden).count(), 2);

    assert_eq!(clear(&state, Some(alice)).await, 2);
    assert_eq!(index(&state).await.len(), 1);

    assert_eq!(clear(&state, None).await, 1);
    assert!(index(&state).await.is_empty());
}

#[tokio::test]
async fn owner_of_reports_the_owning_connection() {
    let state = playing_state().await;
    let owner = Uuid::new_v4();
    let id = spawn(&state, owner, v(0.0, 0.0), "#fff".into(), 1.0).await.expect("spawn");

    assert_eq!(owner_of(&state, id).await, Some(owner));
    assert_eq!(owner_of(&state, Uuid::new_v4()).await, None);
}
