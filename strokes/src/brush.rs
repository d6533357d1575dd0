//! Per-player brush and the draw-state machine.
//!
//! The state machine is a tagged union with a single transition rule:
//! Idle --press--> Drawing, Drawing --release--> Idle. Move events are only
//! meaningful while Drawing, and even then pass through the draw-buffer gate:
//! the pointer must travel a minimum distance from the last sampled position
//! before a new sample is emitted.

#[cfg(test)]
#[path = "brush_test.rs"]
mod brush_test;

use crate::consts::{DEFAULT_DRAW_BUFFER, DEFAULT_THICKNESS};
use crate::geom::Vec3;
use crate::store::StrokeId;

/// Which stroke copy the brush is currently extending.
///
/// A stroke starts on a client-local placeholder for zero-latency feedback
/// and is retargeted to its networked replica once the server confirms the
/// spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeTarget {
    /// Client-local placeholder, keyed by a local-only counter.
    Placeholder(u64),
    /// Server-confirmed networked replica.
    Replica(StrokeId),
}

/// One pointer-move sample that passed the draw-buffer gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveSample {
    pub position: Vec3,
    /// Un-normalized travel since the last sample.
    pub direction: Vec3,
    /// Pressure-scaled thickness for this point.
    pub thickness: f32,
}

/// Draw state of a brush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawState {
    /// No stroke in progress; move events are ignored.
    Idle,
    /// A stroke is in progress.
    Drawing {
        /// The stroke copy receiving samples.
        target: StrokeTarget,
        /// Position of the last emitted sample.
        last: Vec3,
    },
}

/// A per-player drawing tool: color, thickness, draw-buffer distance, and
/// the current draw state.
#[derive(Debug, Clone, PartialEq)]
pub struct Brush {
    pub color: String,
    pub thickness: f32,
    pub draw_buffer: f32,
    state: DrawState,
}

impl Brush {
    #[must_use]
    pub fn new(color: impl Into<String>, thickness: f32, draw_buffer: f32) -> Self {
        Self { color: color.into(), thickness, draw_buffer, state: DrawState::Idle }
    }

    #[must_use]
    pub fn state(&self) -> &DrawState {
        &self.state
    }

    /// The stroke currently being extended, if any.
    #[must_use]
    pub fn target(&self) -> Option<StrokeTarget> {
        match self.state {
            DrawState::Idle => None,
            DrawState::Drawing { target, .. } => Some(target),
        }
    }

    /// Press-start: Idle → Drawing.
    ///
    /// Returns `false` if the brush is already Drawing — a press arriving
    /// mid-stroke is ignored rather than restarting or corrupting the
    /// in-progress stroke.
    pub fn press(&mut self, target: StrokeTarget, at: Vec3) -> bool {
        match self.state {
            DrawState::Idle => {
                self.state = DrawState::Drawing { target, last: at };
                true
            }
            DrawState::Drawing { .. } => false,
        }
    }

    /// Press-end: Drawing → Idle. Returns the stroke that was in progress.
    pub fn release(&mut self) -> Option<StrokeTarget> {
        match self.state {
            DrawState::Idle => None,
            DrawState::Drawing { target, .. } => {
                self.state = DrawState::Idle;
                Some(target)
            }
        }
    }

    /// Pointer move. Emits a sample only while Drawing and only once the
    /// pointer has travelled at least `draw_buffer` from the last sample.
    ///
    /// `pressure` scales the brush thickness for this point (1.0 = full).
    pub fn movement(&mut self, position: Vec3, pressure: f32) -> Option<MoveSample> {
        let DrawState::Drawing { target, last } = self.state else {
            return None;
        };

        let travel = position - last;
        if travel.length() < self.draw_buffer {
            return None;
        }

        self.state = DrawState::Drawing { target, last: position };
        Some(MoveSample { position, direction: travel, thickness: self.thickness * pressure })
    }

    /// Swap the in-progress stroke from placeholder to replica during
    /// ownership handoff. No-op when Idle or when a different stroke is
    /// being drawn.
    pub fn retarget(&mut self, from: StrokeTarget, to: StrokeTarget) -> bool {
        match self.state {
            DrawState::Drawing { target, last } if target == from => {
                self.state = DrawState::Drawing { target: to, last };
                true
            }
            _ => false,
        }
    }

    /// Drop any in-progress stroke, returning to Idle without emitting
    /// anything. Used by the orphan sweep on reconnect.
    pub fn reset(&mut self) {
        self.state = DrawState::Idle;
    }
}

impl Default for Brush {
    fn default() -> Self {
        Self::new("#ffffff", DEFAULT_THICKNESS, DEFAULT_DRAW_BUFFER)
    }
}
