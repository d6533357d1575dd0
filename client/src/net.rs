//! WebSocket runner for a wall client.
//!
//! Manages the socket lifecycle around a [`WallEngine`]: connection,
//! reconnection with exponential backoff, frame decode/dispatch, and pumping
//! host commands in. `Send` effects go out on the socket as binary protobuf
//! frames; everything else is forwarded to the host on the notice channel.

use frames::{Frame, decode_frame, encode_frame};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use strokes::geom::Vec3;

use crate::engine::{Effect, WallEngine};

/// Host-side input for the runner: pointer events and the ready signal.
#[derive(Debug, Clone, Copy)]
pub enum Command {
    PointerPressed(Vec3),
    PointerMoved { position: Vec3, pressure: f32 },
    PointerReleased,
    Ready,
}

const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 10_000;

/// Run the client against `url` until the command channel closes.
///
/// Reconnects with exponential backoff on every disconnect; the engine's
/// orphan sweep runs on each fresh welcome.
pub async fn run_client(
    url: &str,
    engine: &mut WallEngine,
    commands: &mut mpsc::Receiver<Command>,
    notices: &mpsc::Sender<Effect>,
) {
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        match connect_and_run(url, engine, commands, notices).await {
            Ok(ConnectionEnd::HostClosed) => {
                info!("client runner stopping: host closed the command channel");
                return;
            }
            Ok(ConnectionEnd::Disconnected) => {
                info!("ws disconnected");
                backoff_ms = INITIAL_BACKOFF_MS;
            }
            Err(e) => {
                warn!(error = %e, "ws connection failed");
            }
        }

        forward_notices(notices, engine.connection_lost()).await;

        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
    }
}

enum ConnectionEnd {
    /// The server or network ended the connection; reconnect.
    Disconnected,
    /// The host dropped its command sender; shut down.
    HostClosed,
}

async fn connect_and_run(
    url: &str,
    engine: &mut WallEngine,
    commands: &mut mpsc::Receiver<Command>,
    notices: &mpsc::Sender<Effect>,
) -> Result<ConnectionEnd, tokio_tungstenite::tungstenite::Error> {
    let (socket, _response) = connect_async(url).await?;
    let (mut write, mut read) = socket.split();
    info!(%url, "ws connected");

    loop {
        tokio::select! {
            msg = read.next() => {
                let Some(msg) = msg else {
                    return Ok(ConnectionEnd::Disconnected);
                };
                let frame = match msg? {
                    Message::Binary(bytes) => match decode_frame(&bytes) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "dropping undecodable binary frame");
                            continue;
                        }
                    },
                    Message::Text(text) => match serde_json::from_str::<Frame>(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "dropping unparsable text frame");
                            continue;
                        }
                    },
                    Message::Close(_) => return Ok(ConnectionEnd::Disconnected),
                    _ => continue,
                };

                let effects = engine.handle_frame(&frame);
                if apply_effects(&mut write, notices, effects).await.is_err() {
                    return Ok(ConnectionEnd::Disconnected);
                }
            }
            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    return Ok(ConnectionEnd::HostClosed);
                };
                let effects = match cmd {
                    Command::PointerPressed(position) => engine.pointer_pressed(position),
                    Command::PointerMoved { position, pressure } => {
                        engine.pointer_moved(position, pressure)
                    }
                    Command::PointerReleased => engine.pointer_released(),
                    Command::Ready => engine.ready(),
                };
                if apply_effects(&mut write, notices, effects).await.is_err() {
                    return Ok(ConnectionEnd::Disconnected);
                }
            }
        }
    }
}

/// Send outbound frames on the socket and forward the rest to the host.
async fn apply_effects<S>(
    write: &mut S,
    notices: &mpsc::Sender<Effect>,
    effects: Vec<Effect>,
) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    for effect in effects {
        match effect {
            Effect::Send(frame) => {
                let bytes = encode_frame(&frame);
                if write.send(Message::Binary(bytes.into())).await.is_err() {
                    return Err(());
                }
            }
            other => forward_notice(notices, other).await,
        }
    }
    Ok(())
}

async fn forward_notices(notices: &mpsc::Sender<Effect>, effects: Vec<Effect>) {
    for effect in effects {
        forward_notice(notices, effect).await;
    }
}

async fn forward_notice(notices: &mpsc::Sender<Effect>, effect: Effect) {
    // Best-effort: a saturated or closed host channel never blocks the
    // socket loop.
    if notices.try_send(effect).is_err() {
        warn!("dropping engine notice: host channel full or closed");
    }
}
