//! Drawing-client core for the graffiti wall.
//!
//! The heart of this crate is [`engine::WallEngine`]: a transport-free state
//! machine that turns pointer input into stroke frames and applies incoming
//! frames to its replica store. It owns the local-placeholder trick — a
//! stroke begins on a client-only mesh for zero-latency feedback while the
//! server spawn round-trip is in flight, then hands off to the networked
//! replica on confirmation.
//!
//! The host (tablet UI, out of scope here) feeds pointer events in and
//! receives [`engine::Effect`]s back; it never mutates stroke state
//! directly. [`net`] wires an engine to a live server over WebSocket with
//! reconnect.

pub mod engine;
pub mod net;
