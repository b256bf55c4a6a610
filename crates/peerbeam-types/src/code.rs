use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Symbols used for generated codes. Lowercase only so codes survive being
/// read aloud or typed on a phone keyboard.
const GENERATED_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a generated code. 36^8 ≈ 2.8e12 possible codes.
pub const GENERATED_LEN: usize = 8;

/// Upper bound for codes typed in by a user.
pub const MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid share code {0:?}: expected 1-64 characters from [A-Za-z0-9_-]")]
pub struct InvalidShareCode(pub String);

/// Short, URL-safe code identifying a rendezvous room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShareCode(String);

impl ShareCode {
    /// Generate a fresh random code.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..GENERATED_LEN)
            .map(|_| GENERATED_ALPHABET[rng.random_range(0..GENERATED_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Validate user input. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, InvalidShareCode> {
        let trimmed = input.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_LEN
            && trimmed
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(InvalidShareCode(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShareCode {
    type Err = InvalidShareCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShareCode {
    type Error = InvalidShareCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShareCode> for String {
    fn from(code: ShareCode) -> Self {
        code.0
    }
}
