// Persisted records: sessions, participants and assignments.

use chrono::{DateTime, Utc};

/// Chat user identifier as handed over by the transport.
pub type UserId = i64;

/// Length of a session code.
pub const CODE_LEN: usize = 6;

/// Characters a session code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Inclusive bounds on a participant name, counted in characters.
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 50;

/// Wishes input meaning "no preference".
pub const NO_WISHES: &str = "-";

/// One gift-exchange game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub code: String,
    pub organizer_id: UserId,
    pub created_at: DateTime<Utc>,
    pub is_drawn: bool,
}

/// A user enrolled in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: i64,
    pub session_id: i64,
    pub user_id: UserId,
    pub name: String,
    /// Free text; empty when the participant has no preference.
    pub wishes: String,
    pub joined_at: DateTime<Utc>,
}

/// One giver -> receiver pair produced by the draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub id: i64,
    pub session_id: i64,
    pub giver_participant_id: i64,
    pub receiver_participant_id: i64,
}

/// Who a participant gives a gift to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftTarget {
    pub receiver_name: String,
    pub receiver_wishes: String,
}

/// Check the shape of a session code: exactly six characters from
/// [`CODE_ALPHABET`]. Callers normalize case before calling.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

/// Normalize user-typed code input: surrounding whitespace is dropped and
/// letters are upper-cased.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Normalize wishes input. The "no preference" marker is stored as the
/// empty string.
pub fn normalize_wishes(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed == NO_WISHES {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Whether a (trimmed) name is acceptable in the join conversation.
pub fn is_valid_name(name: &str) -> bool {
    (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name.chars().count())
}

/// Whether a (trimmed) name can be stored at all. Looser than
/// [`is_valid_name`]: direct API callers may use one-letter labels.
pub fn is_storable_name(name: &str) -> bool {
    (1..=NAME_MAX_LEN).contains(&name.chars().count())
}
