use std::{collections::HashSet, fmt, iter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::events::{EventSink, LinkEvent};

pub const MIN_SHORTCODE_LEN: usize = 3;
pub const MAX_SHORTCODE_LEN: usize = 15;
pub const GENERATED_SHORTCODE_LEN: usize = 6;

/// Upper bound on random draws before [`ShortcodeError::GenerationExhausted`].
pub const MAX_GENERATION_ATTEMPTS: usize = 64;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A 3 to 15 character, ASCII alphanumeric link identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Shortcode(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortcodeValidationError {
    #[error("shortcode must be 3-15 characters long, got {len}")]
    InvalidLength { len: usize },
    #[error("shortcode contains non-alphanumeric characters: {invalid_chars}")]
    InvalidCharacters { invalid_chars: String },
}

impl Shortcode {
    /// # Errors
    /// Returns [`Err`] when `code` is not 3-15 ASCII alphanumeric characters.
    pub fn new(code: String) -> Result<Self, ShortcodeValidationError> {
        let invalid_chars: String = code
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric())
            .collect();
        if !invalid_chars.is_empty() {
            return Err(ShortcodeValidationError::InvalidCharacters { invalid_chars });
        }

        let len = code.len();
        if !(MIN_SHORTCODE_LEN..=MAX_SHORTCODE_LEN).contains(&len) {
            return Err(ShortcodeValidationError::InvalidLength { len });
        }

        Ok(Self(code))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Shortcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Shortcode {
    type Error = ShortcodeValidationError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl From<Shortcode> for String {
    fn from(code: Shortcode) -> Self {
        code.into_inner()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortcodeError {
    #[error("preferred shortcode {0} is already in use, please choose another")]
    Collision(Shortcode),
    #[error("no unused shortcode found after {attempts} attempts")]
    GenerationExhausted { attempts: usize },
}

/// Source of random candidate shortcodes.
#[cfg_attr(test, mockall::automock)]
pub trait CandidateSource: Send + Sync {
    fn candidate(&self) -> Shortcode;
}

/// Draws [`GENERATED_SHORTCODE_LEN`] characters from the lowercase base-36 alphabet.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCandidates;

impl CandidateSource for RandomCandidates {
    fn candidate(&self) -> Shortcode {
        let code = iter::repeat_with(|| {
            char::from(BASE36_ALPHABET[rand::random_range(0..BASE36_ALPHABET.len())])
        })
        .take(GENERATED_SHORTCODE_LEN)
        .collect();
        Shortcode(code)
    }
}

/// Picks the shortcode for a new link without touching any registry state.
pub struct ShortcodeGenerator {
    candidates: Box<dyn CandidateSource>,
    max_attempts: usize,
}

impl Default for ShortcodeGenerator {
    fn default() -> Self {
        Self::new(Box::new(RandomCandidates), MAX_GENERATION_ATTEMPTS)
    }
}

impl ShortcodeGenerator {
    #[must_use]
    pub fn new(candidates: Box<dyn CandidateSource>, max_attempts: usize) -> Self {
        Self {
            candidates,
            max_attempts,
        }
    }

    /// Uses `preferred` when it is free, otherwise draws random candidates
    /// until one is absent from `existing_codes`.
    ///
    /// # Errors
    /// Returns [`ShortcodeError::Collision`] if `preferred` is already taken,
    /// and [`ShortcodeError::GenerationExhausted`] if every random draw collided.
    #[instrument(skip(self, existing_codes, events), fields(existing = existing_codes.len()))]
    pub fn resolve(
        &self,
        preferred: Option<&Shortcode>,
        existing_codes: &HashSet<Shortcode>,
        events: &dyn EventSink,
    ) -> Result<Shortcode, ShortcodeError> {
        if let Some(preferred) = preferred {
            if existing_codes.contains(preferred) {
                events.emit(&LinkEvent::ShortcodeCollision {
                    preferred_shortcode: preferred.clone(),
                });
                return Err(ShortcodeError::Collision(preferred.clone()));
            }
            return Ok(preferred.clone());
        }

        for _ in 0..self.max_attempts {
            let attempt = self.candidates.candidate();
            let unique = !existing_codes.contains(&attempt);
            events.emit(&LinkEvent::ShortcodeGenerationAttempt {
                shortcode: attempt.clone(),
                unique,
            });
            if unique {
                return Ok(attempt);
            }
            warn!(%attempt, "Generated shortcode that was already taken");
        }

        Err(ShortcodeError::GenerationExhausted {
            attempts: self.max_attempts,
        })
    }
}
