//! Cell Arena Server Library
//!
//! Authoritative simulation of a 2D arena where circular cells grow by
//! eating pellets and each other, split, merge back, and share the field
//! with scripted bots. The same [`game::game_loop::step`] drives the
//! WebTransport server and the local harness.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;
