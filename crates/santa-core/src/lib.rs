// Library root: session store, draw engine, join conversation and the
// organizer-facing coordinator of a Secret Santa game.

pub mod config;
pub mod coordinator;
pub mod db;
pub mod draw;
pub mod error;
pub mod join;
pub mod model;

pub use coordinator::{DrawSummary, SessionCoordinator};
pub use db::SessionStore;
pub use draw::DrawEngine;
pub use error::SantaError;
pub use join::{JoinFlow, JoinReply, JoinState};
