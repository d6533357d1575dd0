#![allow(clippy::float_cmp)]

use super::*;
use crate::geom::Vec3;

fn v(x: f32, y: f32) -> Vec3 {
    Vec3::new(x, y, 0.0)
}

// =============================================================
// Strip invariants
// =============================================================

#[test]
fn begin_is_degenerate_quad() {
    let mesh = StrokeMesh::begin(v(0.0, 0.0), 2.0);

    assert_eq!(mesh.sample_count(), 1);
    assert_eq!(mesh.vertices(), &[v(0.0, 1.0), v(0.0, -1.0)]);
    assert_eq!(mesh.uvs(), &[[0.0, 0.0], [0.0, 1.0]]);
    assert!(mesh.triangles().is_empty());
    assert!(!mesh.is_aligned());
    assert!(mesh.is_dot());
}

#[test]
fn counts_hold_for_any_number_of_appends() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 1.0);
    for n in 1..=20u32 {
        #[allow(clippy::cast_precision_loss)]
        let x = n as f32;
        assert!(mesh.add_point(v(x, 0.0), v(1.0, 0.0), 1.0));
        assert_eq!(mesh.sample_count(), n + 1);
        assert_eq!(mesh.vertices().len(), 2 * (n as usize + 1));
        assert_eq!(mesh.uvs().len(), mesh.vertices().len());
        assert_eq!(mesh.triangles().len(), 6 * n as usize);
    }
}

#[test]
fn triangle_indices_stay_in_range() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 1.0);
    mesh.add_point(v(1.0, 0.0), v(1.0, 0.0), 1.0);
    mesh.add_point(v(2.0, 1.0), v(1.0, 1.0), 1.0);

    let count = mesh.vertices().len() as u32;
    assert!(mesh.triangles().iter().all(|&i| i < count));
}

#[test]
fn zero_direction_appends_nothing() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 1.0);
    assert!(!mesh.add_point(v(1.0, 0.0), Vec3::ZERO, 1.0));
    assert_eq!(mesh.sample_count(), 1);
    assert!(mesh.triangles().is_empty());
}

// =============================================================
// Worked example: 2-wide stroke, right then up
// =============================================================

#[test]
fn two_wide_stroke_walk() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 2.0);
    assert_eq!(mesh.vertices(), &[v(0.0, 1.0), v(0.0, -1.0)]);

    // First real point travelling right: direction (1,0), no visible
    // rotation needed but the alignment flag flips exactly once.
    assert!(mesh.add_point(v(10.0, 0.0), v(1.0, 0.0), 2.0));
    assert!(mesh.is_aligned());
    assert_eq!(mesh.vertices().len(), 4);
    assert_eq!(mesh.triangles().len(), 6);
    assert_eq!(mesh.vertices()[2], v(10.0, 1.0));
    assert_eq!(mesh.vertices()[3], v(10.0, -1.0));

    // Second point travelling up: perpendicular flips to (-1, 0).
    assert!(mesh.add_point(v(10.0, 5.0), v(0.0, 5.0), 2.0));
    assert_eq!(mesh.vertices().len(), 6);
    assert_eq!(mesh.triangles().len(), 12);
    assert_eq!(mesh.vertices()[4], v(9.0, 5.0));
    assert_eq!(mesh.vertices()[5], v(11.0, 5.0));

    // The initial pair was not rotated a second time.
    assert_eq!(mesh.vertices()[0], v(0.0, 1.0));
    assert_eq!(mesh.vertices()[1], v(0.0, -1.0));
    assert!(!mesh.is_dot());
}

#[test]
fn initial_quad_rotates_toward_first_direction() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 2.0);

    // Travelling straight up: the initial edge must land on (-1, 0)/(1, 0).
    assert!(mesh.add_point(v(0.0, 10.0), v(0.0, 1.0), 2.0));
    assert_eq!(mesh.vertices()[0], v(-1.0, 0.0));
    assert_eq!(mesh.vertices()[1], v(1.0, 0.0));
}

#[test]
fn rotation_is_about_the_stroke_origin() {
    let mut mesh = StrokeMesh::begin(v(5.0, 5.0), 2.0);
    assert!(mesh.add_point(v(5.0, 10.0), v(0.0, 1.0), 2.0));

    assert_eq!(mesh.vertices()[0], v(4.0, 5.0));
    assert_eq!(mesh.vertices()[1], v(6.0, 5.0));
}

#[test]
fn per_point_thickness_varies_width() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 2.0);
    mesh.add_point(v(1.0, 0.0), v(1.0, 0.0), 2.0);
    mesh.add_point(v(2.0, 0.0), v(1.0, 0.0), 4.0);

    assert_eq!(mesh.vertices()[4], v(2.0, 2.0));
    assert_eq!(mesh.vertices()[5], v(2.0, -2.0));
}

// =============================================================
// Determinism and snapshots
// =============================================================

#[test]
fn identical_append_sequences_yield_identical_buffers() {
    let sequence = [
        (v(1.0, 0.3), v(1.0, 0.3), 1.7),
        (v(2.2, 1.1), v(1.2, 0.8), 1.4),
        (v(2.9, 2.6), v(0.7, 1.5), 2.1),
        (v(2.4, 3.8), v(-0.5, 1.2), 1.0),
    ];

    let mut owner = StrokeMesh::begin(v(0.0, 0.0), 1.5);
    let mut observer = StrokeMesh::begin(v(0.0, 0.0), 1.5);
    for (pos, dir, thickness) in sequence {
        assert!(owner.add_point(pos, dir, thickness));
        assert!(observer.add_point(pos, dir, thickness));
    }

    assert_eq!(owner, observer);
    assert_eq!(owner.vertices(), observer.vertices());
    assert_eq!(owner.uvs(), observer.uvs());
    assert_eq!(owner.triangles(), observer.triangles());
}

#[test]
fn snapshot_round_trip_is_identity() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 2.0);
    mesh.add_point(v(3.0, 1.0), v(3.0, 1.0), 1.8);
    mesh.add_point(v(5.0, 4.0), v(2.0, 3.0), 2.2);

    let restored = StrokeMesh::from_snapshot(mesh.snapshot()).expect("consistent");
    assert_eq!(restored, mesh);
}

#[test]
fn apply_snapshot_replaces_not_merges() {
    let mut sender = StrokeMesh::begin(v(0.0, 0.0), 2.0);
    sender.add_point(v(1.0, 0.0), v(1.0, 0.0), 2.0);

    let mut receiver = StrokeMesh::begin(v(9.0, 9.0), 0.5);
    receiver.add_point(v(9.5, 9.0), v(1.0, 0.0), 0.5);
    receiver.add_point(v(10.0, 9.0), v(1.0, 0.0), 0.5);

    assert!(receiver.apply_snapshot(sender.snapshot()));
    assert_eq!(receiver, sender);
}

#[test]
fn appends_continue_cleanly_after_snapshot() {
    let mut sender = StrokeMesh::begin(v(0.0, 0.0), 2.0);
    sender.add_point(v(1.0, 0.0), v(1.0, 0.0), 2.0);

    let mut receiver = StrokeMesh::from_snapshot(sender.snapshot()).expect("consistent");
    sender.add_point(v(2.0, 1.0), v(1.0, 1.0), 2.0);
    receiver.add_point(v(2.0, 1.0), v(1.0, 1.0), 2.0);

    assert_eq!(receiver, sender);
}

#[test]
fn inconsistent_snapshot_is_rejected() {
    let mut mesh = StrokeMesh::begin(v(0.0, 0.0), 2.0);
    mesh.add_point(v(1.0, 0.0), v(1.0, 0.0), 2.0);

    let mut bad = mesh.snapshot();
    bad.vertices.pop();
    assert!(StrokeMesh::from_snapshot(bad.clone()).is_none());

    let before = mesh.clone();
    assert!(!mesh.apply_snapshot(bad));
    assert_eq!(mesh, before);
}

#[test]
fn snapshot_with_out_of_range_index_is_rejected() {
    let mut snap = StrokeMesh::begin(v(0.0, 0.0), 2.0).snapshot();
    snap.vertices.extend_from_slice(&[v(1.0, 1.0), v(1.0, -1.0)]);
    snap.uvs.extend_from_slice(&[[1.0, 0.0], [1.0, 1.0]]);
    snap.triangles = vec![0, 2, 1, 2, 99, 1];
    snap.samples = 2;

    assert!(StrokeMesh::from_snapshot(snap).is_none());
}

#[test]
fn snapshot_serde_round_trip() {
    let mut mesh = StrokeMesh::begin(v(0.25, -0.75), 1.3);
    mesh.add_point(v(1.1, 0.2), v(0.85, 0.95), 1.1);

    let snap = mesh.snapshot();
    let json = serde_json::to_string(&snap).expect("serialize");
    let back: MeshSnapshot = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, snap);
}
