// Derangement draw: assign every giver a receiver other than themselves.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Result, SantaError, MIN_PARTICIPANTS};

/// Default number of shuffles tried before falling back to a rotation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Produces derangements by rejection sampling.
///
/// Each attempt shuffles the givers and accepts the shuffle if nobody ended
/// up in their own position. Accepted results are uniform over derangements.
/// If `max_attempts` shuffles all have a fixed point, the engine returns the
/// rotation `receivers[i] = givers[(i + 1) % n]`, which has no fixed point for
/// any `n >= 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawEngine {
    max_attempts: u32,
}

impl Default for DrawEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl DrawEngine {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Return the receivers for `givers`, position by position.
    ///
    /// `givers` must hold at least [`MIN_PARTICIPANTS`] distinct ids; shorter
    /// input is rejected with [`SantaError::InsufficientParticipants`].
    pub fn derange<T, R>(&self, givers: &[T], rng: &mut R) -> Result<Vec<T>>
    where
        T: Clone + PartialEq,
        R: Rng + ?Sized,
    {
        if givers.len() < MIN_PARTICIPANTS {
            return Err(SantaError::InsufficientParticipants {
                count: givers.len(),
            });
        }

        let mut receivers = givers.to_vec();
        for attempt in 1..=self.max_attempts {
            receivers.shuffle(rng);
            if !has_fixed_point(givers, &receivers) {
                debug!(attempt, n = givers.len(), "derangement accepted");
                return Ok(receivers);
            }
        }

        warn!(
            attempts = self.max_attempts,
            n = givers.len(),
            "no derangement found by shuffling, falling back to rotation"
        );
        Ok(rotate_by_one(givers))
    }
}

fn has_fixed_point<T: PartialEq>(givers: &[T], receivers: &[T]) -> bool {
    givers.iter().zip(receivers).any(|(g, r)| g == r)
}

fn rotate_by_one<T: Clone>(givers: &[T]) -> Vec<T> {
    let mut receivers = givers.to_vec();
    receivers.rotate_left(1);
    receivers
}
