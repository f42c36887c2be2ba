//! Transport boundary: upgrade handshake, frame pumping, and the
//! text-frames-only policy.

pub mod connection;
pub mod handler;

pub use handler::{lobby_ws_handler, room_ws_handler};
