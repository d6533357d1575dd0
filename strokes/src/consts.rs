//! Shared numeric defaults for the strokes crate.

// ── Brush ───────────────────────────────────────────────────────

/// Default stroke thickness in wall units.
pub const DEFAULT_THICKNESS: f32 = 1.0;

/// Default minimum pointer travel before a new sample is appended.
pub const DEFAULT_DRAW_BUFFER: f32 = 0.1;

// ── Geometry ────────────────────────────────────────────────────

/// Squared length below which a direction vector is treated as zero.
pub const DIRECTION_EPSILON_SQ: f32 = 1e-12;
