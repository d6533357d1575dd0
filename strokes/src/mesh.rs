//! Stroke mesh: a polygon strip grown one sample at a time.
//!
//! DESIGN
//! ======
//! A stroke is an ordered sequence of samples. Each sample contributes two
//! vertices, offset perpendicular to the travel direction by the
//! pressure-derived half-width, plus one UV row and (from the second sample
//! on) six triangle indices joining it to the previous pair.
//!
//! A freshly begun stroke has no direction yet: it starts as a degenerate
//! quad whose edge points straight up. The first real sample rotates the
//! existing vertices about the stroke origin so that edge aligns with the
//! incoming direction — exactly once per stroke.
//!
//! Appends are pure `f32` arithmetic with no dependence on external state,
//! so every peer that replays the same sequence holds bit-identical buffers.

#[cfg(test)]
#[path = "mesh_test.rs"]
mod mesh_test;

use serde::{Deserialize, Serialize};

use crate::geom::Vec3;

/// A growing polygon-strip mesh for one stroke.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeMesh {
    origin: Vec3,
    vertices: Vec<Vec3>,
    uvs: Vec<[f32; 2]>,
    triangles: Vec<u32>,
    aligned: bool,
    samples: u32,
}

impl StrokeMesh {
    /// Begin a stroke as a degenerate quad centered at `origin`.
    ///
    /// The strip starts with one sample: two vertices offset straight up and
    /// down by half the thickness, no triangles yet.
    #[must_use]
    pub fn begin(origin: Vec3, thickness: f32) -> Self {
        let half_width = thickness * 0.5;
        let up = Vec3::new(0.0, half_width, 0.0);
        Self {
            origin,
            vertices: vec![origin + up, origin - up],
            uvs: vec![[0.0, 0.0], [0.0, 1.0]],
            triangles: Vec::new(),
            aligned: false,
            samples: 1,
        }
    }

    /// Append one sample at `position`, travelling along `direction` with the
    /// given per-point thickness.
    ///
    /// The very first appended sample also rotates the initial quad about the
    /// stroke origin to face the incoming direction. Returns `false` without
    /// appending when `direction` has no usable length; otherwise the sample
    /// count increases by exactly one.
    pub fn add_point(&mut self, position: Vec3, direction: Vec3, thickness: f32) -> bool {
        let Some(dir) = direction.normalized() else {
            return false;
        };
        let normal = dir.perp_xy();
        let half_width = thickness * 0.5;

        if !self.aligned {
            self.align_initial_quad(normal);
            self.aligned = true;
        }

        let base = self.vertices.len() as u32;
        self.vertices.push(position + normal * half_width);
        self.vertices.push(position - normal * half_width);

        #[allow(clippy::cast_precision_loss)]
        let u = self.samples as f32;
        self.uvs.push([u, 0.0]);
        self.uvs.push([u, 1.0]);

        // Two triangles joining the previous vertex pair to the new one.
        self.triangles
            .extend_from_slice(&[base - 2, base, base - 1, base, base + 1, base - 1]);

        self.samples += 1;
        true
    }

    /// Rotate all existing vertices about the origin so the initial edge
    /// (which points up) lands on `normal`.
    fn align_initial_quad(&mut self, normal: Vec3) {
        // The rotation taking (0, 1) to `normal` has cos = normal.y and
        // sin = -normal.x.
        let (cos_t, sin_t) = (normal.y, -normal.x);
        for v in &mut self.vertices {
            *v = self.origin + (*v - self.origin).rotated_xy(cos_t, sin_t);
        }
    }

    // --- Queries ---

    /// The press-start position this stroke grew from.
    #[must_use]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    #[must_use]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    #[must_use]
    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    #[must_use]
    pub fn triangles(&self) -> &[u32] {
        &self.triangles
    }

    /// Number of samples, including the initial degenerate one.
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    /// Whether the one-time alignment rotation has run.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// A stroke that never received a real sample renders as a dot.
    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.samples == 1
    }

    // --- Snapshots ---

    /// Copy the full buffer state for transfer.
    #[must_use]
    pub fn snapshot(&self) -> MeshSnapshot {
        MeshSnapshot {
            origin: self.origin,
            vertices: self.vertices.clone(),
            uvs: self.uvs.clone(),
            triangles: self.triangles.clone(),
            aligned: self.aligned,
            samples: self.samples,
        }
    }

    /// Rebuild a mesh from a transferred snapshot.
    ///
    /// Returns `None` if the snapshot violates the strip invariants.
    #[must_use]
    pub fn from_snapshot(snap: MeshSnapshot) -> Option<Self> {
        if !snap.is_consistent() {
            return None;
        }
        Some(Self {
            origin: snap.origin,
            vertices: snap.vertices,
            uvs: snap.uvs,
            triangles: snap.triangles,
            aligned: snap.aligned,
            samples: snap.samples,
        })
    }

    /// Replace this mesh's entire state with a transferred snapshot.
    ///
    /// Replace, not merge: the previous buffers are discarded wholesale.
    /// Returns `false` (leaving the mesh untouched) for an inconsistent
    /// snapshot.
    pub fn apply_snapshot(&mut self, snap: MeshSnapshot) -> bool {
        let Some(mesh) = Self::from_snapshot(snap) else {
            return false;
        };
        *self = mesh;
        true
    }
}

/// Full buffer state of a stroke mesh, as transferred during handoff and
/// late-join resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSnapshot {
    pub origin: Vec3,
    pub vertices: Vec<Vec3>,
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<u32>,
    pub aligned: bool,
    pub samples: u32,
}

impl MeshSnapshot {
    /// Check the polygon-strip invariants: two vertices and one UV row per
    /// sample, six indices per segment, all indices in range.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let samples = self.samples as usize;
        if samples == 0 {
            return false;
        }
        if self.vertices.len() != 2 * samples || self.uvs.len() != self.vertices.len() {
            return false;
        }
        if self.triangles.len() != 6 * (samples - 1) {
            return false;
        }
        let vertex_count = self.vertices.len() as u32;
        self.triangles.iter().all(|&i| i < vertex_count)
    }
}
