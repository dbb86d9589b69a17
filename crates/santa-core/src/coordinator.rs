// Organizer-facing operations: create, list, draw, lookups.

use std::sync::Arc;

use tracing::info;

use crate::config::DrawConfig;
use crate::db::SessionStore;
use crate::draw::DrawEngine;
use crate::error::Result;
use crate::model::{GiftTarget, Participant, Session, UserId};

/// Result of a successful draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSummary {
    pub participants: usize,
}

pub struct SessionCoordinator {
    store: Arc<SessionStore>,
    engine: DrawEngine,
}

impl SessionCoordinator {
    pub fn new(store: Arc<SessionStore>, config: &DrawConfig) -> Self {
        Self {
            store,
            engine: DrawEngine::new(config.max_attempts),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Start a new game for `organizer_id`, replacing their undrawn one.
    pub fn create(&self, organizer_id: UserId) -> Result<String> {
        self.store.create_session(organizer_id)
    }

    pub fn join_session(
        &self,
        code: &str,
        user_id: UserId,
        name: &str,
        wishes: &str,
    ) -> Result<Participant> {
        self.store.add_participant(code, user_id, name, wishes)
    }

    pub fn list_participants(&self, code: &str) -> Result<Vec<Participant>> {
        self.store.list_participants(code)
    }

    /// Run the one-time draw. Fewer than three participants is reported as
    /// `InsufficientParticipants`, whose message tells the organizer how many
    /// more are needed.
    pub fn run_draw(&self, code: &str) -> Result<DrawSummary> {
        let assignments = self
            .store
            .perform_draw(code, &self.engine, &mut rand::thread_rng())?;
        info!(code, pairs = assignments.len(), "draw finished");
        Ok(DrawSummary {
            participants: assignments.len(),
        })
    }

    /// The game a user is most likely asking about: the one they organize,
    /// otherwise the one they joined last.
    pub fn whose_game(&self, user_id: UserId) -> Result<Option<Session>> {
        self.store.get_active_or_latest_session(user_id)
    }

    pub fn get_assignment_for(&self, user_id: UserId, code: &str) -> Result<Option<GiftTarget>> {
        self.store.get_assignment_for(user_id, code)
    }
}
