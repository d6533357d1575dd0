//! Session state machine — the server-authoritative experience phases.
//!
//! DESIGN
//! ======
//! `Session` is a pure state machine: every input is an explicit method call
//! carrying the current instant, and every transition comes back as a value
//! for the caller to broadcast. Waiting → Loading fires on the quorum'th
//! distinct ready signal; Loading → Playing and the optional Playing →
//! Finished timer are driven by [`Session::tick`] against stored deadlines,
//! so tests never sleep and the runtime ticker stays trivial.
//!
//! Only the server holds a `Session`. Clients receive phase changes as
//! `session:state` broadcasts and may do nothing but ask to be marked ready.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use frames::{Data, ErrorCode, Frame, Phase};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::services::wall;
use crate::state::AppState;

/// How often the runtime checks session deadlines.
const TICK_INTERVAL_MS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot finish the round while {0}")]
    FinishOutsidePlaying(Phase),
    #[error("cannot reset the session while {0}")]
    ResetOutsideFinished(Phase),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        "E_BAD_PHASE"
    }
}

/// One applied phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

/// The authoritative session state machine.
pub struct Session {
    phase: Phase,
    ready: HashSet<Uuid>,
    quorum: usize,
    load_countdown: Duration,
    play_duration: Option<Duration>,
    deadline: Option<Instant>,
}

impl Session {
    #[must_use]
    pub fn new(quorum: usize, load_countdown: Duration, play_duration: Option<Duration>) -> Self {
        Self {
            phase: Phase::Waiting,
            ready: HashSet::new(),
            quorum: quorum.max(1),
            load_countdown,
            play_duration,
            deadline: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Distinct connections currently marked ready.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Mark a connection ready. Transitions Waiting → Loading exactly when
    /// the quorum'th distinct connection readies; duplicates from the same
    /// connection never count twice, and readies outside Waiting are
    /// ignored.
    pub fn mark_ready(&mut self, conn: Uuid, now: Instant) -> Option<Transition> {
        if self.phase != Phase::Waiting {
            return None;
        }
        if !self.ready.insert(conn) {
            return None;
        }
        if self.ready.len() < self.quorum {
            return None;
        }

        self.deadline = Some(now + self.load_countdown);
        Some(self.advance(Phase::Loading))
    }

    /// Withdraw a departing connection's ready mark so the quorum counts
    /// only live players.
    pub fn withdraw_ready(&mut self, conn: Uuid) {
        if self.phase == Phase::Waiting {
            self.ready.remove(&conn);
        }
    }

    /// Advance deadline-driven transitions: the Loading countdown and the
    /// optional play timer.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        let due = self.deadline.is_some_and(|d| now >= d);
        match self.phase {
            Phase::Loading if due => {
                self.deadline = self.play_duration.map(|d| now + d);
                Some(self.advance(Phase::Playing))
            }
            Phase::Playing if due => {
                self.deadline = None;
                Some(self.advance(Phase::Finished))
            }
            _ => None,
        }
    }

    /// Admin/timer trigger: Playing → Finished.
    ///
    /// # Errors
    ///
    /// Rejected outside Playing.
    pub fn finish(&mut self) -> Result<Transition, SessionError> {
        if self.phase != Phase::Playing {
            return Err(SessionError::FinishOutsidePlaying(self.phase));
        }
        self.deadline = None;
        Ok(self.advance(Phase::Finished))
    }

    /// Admin confirm: Finished → Waiting, restarting the cycle. The caller
    /// clears the stroke store alongside.
    ///
    /// # Errors
    ///
    /// Rejected outside Finished.
    pub fn reset(&mut self) -> Result<Transition, SessionError> {
        if self.phase != Phase::Finished {
            return Err(SessionError::ResetOutsideFinished(self.phase));
        }
        self.ready.clear();
        self.deadline = None;
        Ok(self.advance(Phase::Waiting))
    }

    fn advance(&mut self, to: Phase) -> Transition {
        let from = self.phase;
        self.phase = to;
        Transition { from, to }
    }
}

// =============================================================================
// BROADCAST + TICKER
// =============================================================================

/// Build the `session:state` frame announcing a phase.
#[must_use]
pub fn phase_frame(phase: Phase) -> Frame {
    let mut data = Data::new();
    data.insert("phase".into(), json!(phase.as_str()));
    Frame::request("session:state", data)
}

/// Announce an applied transition to every client.
pub async fn broadcast_transition(state: &AppState, transition: Transition) {
    info!(from = %transition.from, to = %transition.to, "session transition");
    wall::broadcast(state, &phase_frame(transition.to), None).await;
}

/// Spawn the background task driving deadline transitions. Returns a handle
/// for shutdown.
pub fn spawn_session_ticker(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let transition = {
                let mut wall = state.wall.write().await;
                wall.session.tick(Instant::now())
            };
            if let Some(t) = transition {
                broadcast_transition(&state, t).await;
            }
        }
    })
}
