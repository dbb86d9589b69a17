// Join conversation: code -> name -> wishes -> enrolled.
//
// Each user has at most one conversation in flight. The state carries only
// what has been collected so far and is dropped on cancel or completion.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::JoinConfig;
use crate::db::SessionStore;
use crate::error::SantaError;
use crate::model::{
    is_valid_code, is_valid_name, normalize_code, UserId, CODE_LEN, NAME_MAX_LEN, NAME_MIN_LEN,
};

/// Where a user is in the join conversation. Idle users have no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinState {
    AwaitingCode,
    AwaitingName { code: String },
    AwaitingWishes { code: String, name: String },
}

/// The outcome of one conversation step, rendered to the user via `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinReply {
    /// Carries the first configured cancel keyword, if any, for the prompt.
    AskCode { cancel_keyword: Option<String> },
    InvalidCode,
    UnknownCode,
    AlreadyDrawn,
    AskName { code: String },
    InvalidName,
    AskWishes,
    Joined { code: String, name: String },
    AlreadyJoined,
    /// The session disappeared between code entry and completion, e.g. the
    /// organizer replaced it with a new one.
    SessionClosed,
    Cancelled,
    Failed,
}

impl fmt::Display for JoinReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinReply::AskCode {
                cancel_keyword: Some(keyword),
            } => write!(
                f,
                "Enter the {CODE_LEN}-character game code (or \"{keyword}\" to stop):"
            ),
            JoinReply::AskCode {
                cancel_keyword: None,
            } => write!(f, "Enter the {CODE_LEN}-character game code:"),
            JoinReply::InvalidCode => write!(
                f,
                "A game code is exactly {CODE_LEN} letters and digits. Try again:"
            ),
            JoinReply::UnknownCode => {
                write!(f, "No game found with that code. Check it and try again:")
            }
            JoinReply::AlreadyDrawn => write!(
                f,
                "The draw for this game has already taken place, it can no longer be joined."
            ),
            JoinReply::AskName { code } => write!(
                f,
                "Game {code} found! What name should the others see? \
                 ({NAME_MIN_LEN}-{NAME_MAX_LEN} characters)"
            ),
            JoinReply::InvalidName => write!(
                f,
                "The name must be {NAME_MIN_LEN} to {NAME_MAX_LEN} characters long. Try again:"
            ),
            JoinReply::AskWishes => write!(
                f,
                "What would you like to get? Write your wishes, or \"-\" for no preference:"
            ),
            JoinReply::Joined { code, name } => write!(
                f,
                "You're in, {name}! You joined game {code}. \
                 You'll find out who you're gifting once the organizer runs the draw."
            ),
            JoinReply::AlreadyJoined => write!(f, "You have already joined this game."),
            JoinReply::SessionClosed => write!(
                f,
                "This game no longer exists. Ask the organizer for the new code."
            ),
            JoinReply::Cancelled => write!(f, "Joining cancelled."),
            JoinReply::Failed => write!(f, "Something went wrong, please try again later."),
        }
    }
}

/// Per-user join conversations on top of a [`SessionStore`].
pub struct JoinFlow {
    store: Arc<SessionStore>,
    cancel_keywords: Vec<String>,
    states: Mutex<HashMap<UserId, JoinState>>,
}

impl JoinFlow {
    pub fn new(store: Arc<SessionStore>, config: &JoinConfig) -> Self {
        Self {
            store,
            cancel_keywords: config
                .cancel_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .collect(),
            states: Mutex::new(HashMap::new()),
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<UserId, JoinState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin (or restart) the conversation for `user_id`.
    pub fn start(&self, user_id: UserId) -> JoinReply {
        if self.states().insert(user_id, JoinState::AwaitingCode).is_some() {
            debug!(user_id, "restarted join conversation");
        }
        JoinReply::AskCode {
            cancel_keyword: self.cancel_keywords.first().cloned(),
        }
    }

    /// Current state for `user_id`, `None` when idle.
    pub fn state(&self, user_id: UserId) -> Option<JoinState> {
        self.states().get(&user_id).cloned()
    }

    pub fn is_active(&self, user_id: UserId) -> bool {
        self.states().contains_key(&user_id)
    }

    /// Drop the conversation for `user_id`. Returns whether one existed.
    pub fn cancel(&self, user_id: UserId) -> bool {
        self.states().remove(&user_id).is_some()
    }

    /// Feed one message into the user's conversation.
    ///
    /// Returns `None` when the user is idle, leaving the text for the caller
    /// to interpret. Cancel keywords apply while the code or name is asked
    /// for; at the wishes step any text is taken as the wishes.
    pub fn handle(&self, user_id: UserId, text: &str) -> Option<JoinReply> {
        let state = self.states().remove(&user_id)?;

        let cancellable = !matches!(state, JoinState::AwaitingWishes { .. });
        let (next, reply) = if cancellable && self.is_cancel(text) {
            (None, JoinReply::Cancelled)
        } else {
            self.step(user_id, state, text)
        };

        if let Some(next) = next {
            self.states().insert(user_id, next);
        }
        Some(reply)
    }

    fn is_cancel(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.cancel_keywords.iter().any(|k| *k == text)
    }

    fn step(
        &self,
        user_id: UserId,
        state: JoinState,
        text: &str,
    ) -> (Option<JoinState>, JoinReply) {
        match state {
            JoinState::AwaitingCode => self.on_code(text),
            JoinState::AwaitingName { code } => {
                let name = text.trim();
                if is_valid_name(name) {
                    let name = name.to_string();
                    (Some(JoinState::AwaitingWishes { code, name }), JoinReply::AskWishes)
                } else {
                    (Some(JoinState::AwaitingName { code }), JoinReply::InvalidName)
                }
            }
            JoinState::AwaitingWishes { code, name } => {
                (None, self.on_wishes(user_id, &code, &name, text))
            }
        }
    }

    fn on_code(&self, text: &str) -> (Option<JoinState>, JoinReply) {
        let code = normalize_code(text);
        if !is_valid_code(&code) {
            return (Some(JoinState::AwaitingCode), JoinReply::InvalidCode);
        }

        match self.store.get_session_by_code(&code) {
            Ok(None) => (Some(JoinState::AwaitingCode), JoinReply::UnknownCode),
            Ok(Some(session)) if session.is_drawn => (None, JoinReply::AlreadyDrawn),
            Ok(Some(session)) => (
                Some(JoinState::AwaitingName {
                    code: session.code.clone(),
                }),
                JoinReply::AskName { code: session.code },
            ),
            Err(e) => {
                warn!(code = %code, "session lookup failed: {e}");
                (Some(JoinState::AwaitingCode), JoinReply::Failed)
            }
        }
    }

    fn on_wishes(&self, user_id: UserId, code: &str, name: &str, wishes: &str) -> JoinReply {
        match self.store.add_participant(code, user_id, name, wishes) {
            Ok(participant) => {
                info!(
                    user_id,
                    code,
                    participant_id = participant.id,
                    "join conversation completed"
                );
                JoinReply::Joined {
                    code: code.to_string(),
                    name: participant.name,
                }
            }
            Err(SantaError::DuplicateParticipant) => JoinReply::AlreadyJoined,
            Err(SantaError::AlreadyDrawn) => JoinReply::AlreadyDrawn,
            Err(SantaError::SessionNotFound) => JoinReply::SessionClosed,
            Err(e) => {
                warn!(user_id, code, "failed to add participant: {e}");
                JoinReply::Failed
            }
        }
    }
}
