//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! built exactly once in `main` — there is no global session singleton to
//! race on. It holds the single wall: connected clients, the authoritative
//! session state machine, and the server's own copy of every stroke replica
//! (the server applies the same append computation as every observer, which
//! is what lets it answer snapshot requests for departed owners).

use std::collections::HashMap;
use std::sync::Arc;

use frames::Frame;
use strokes::store::StrokeStore;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::services::session::Session;

// =============================================================================
// CLIENTS
// =============================================================================

/// Connection privilege level, declared at upgrade time.
///
/// The installation runs on a closed network; the admin console marks itself
/// with a query parameter rather than authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player,
    Admin,
}

/// One live connection: its outgoing frame channel, role, and brush color.
pub struct ConnectedClient {
    pub tx: mpsc::Sender<Frame>,
    pub role: Role,
    pub color: String,
}

// =============================================================================
// WALL STATE
// =============================================================================

/// The single wall everyone draws on. Kept in memory for the lifetime of the
/// process; strokes survive client churn until a session reset clears them.
pub struct WallState {
    pub session: Session,
    pub strokes: StrokeStore,
    /// Connected clients: connection ID -> sender for outgoing frames.
    pub clients: HashMap<Uuid, ConnectedClient>,
}

impl WallState {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            session: Session::new(config.ready_quorum, config.load_countdown, config.play_duration),
            strokes: StrokeStore::new(),
            clients: HashMap::new(),
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum — all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub wall: Arc<RwLock<WallState>>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let wall = WallState::new(&config);
        Self { wall: Arc::new(RwLock::new(wall)), config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::time::Duration;

    use super::*;

    /// App state with the default test tuning: quorum 3, instant countdown,
    /// no play timer.
    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with(3, Duration::ZERO, None)
    }

    #[must_use]
    pub fn test_app_state_with(
        quorum: usize,
        load_countdown: Duration,
        play_duration: Option<Duration>,
    ) -> AppState {
        let config = Config {
            ready_quorum: quorum,
            load_countdown,
            play_duration,
            ..Config::default()
        };
        AppState::new(config)
    }

    /// Register a connection directly, returning its frame receiver.
    pub async fn connect_client(
        state: &AppState,
        client_id: Uuid,
        role: Role,
    ) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel::<Frame>(64);
        let mut wall = state.wall.write().await;
        wall.clients
            .insert(client_id, ConnectedClient { tx, role, color: "#f2f2f2".to_owned() });
        rx
    }
}
