//! Subject id newtype.
//!
//! The identity provider issues an opaque string id for every account (the
//! "subject"). Profile documents are keyed by the same id, so both sides of
//! the account model share this type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`SubjectId`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum SubjectIdError {
    /// The input string is empty.
    #[error("subject id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("subject id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// An opaque account id issued by the identity provider.
///
/// Segno never mints these itself - they are accepted verbatim from the
/// provider and used to key profile documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Maximum length accepted for a subject id.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a `SubjectId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or longer than 128 characters.
    pub fn parse(s: &str) -> Result<Self, SubjectIdError> {
        if s.is_empty() {
            return Err(SubjectIdError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(SubjectIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `SubjectId` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SubjectId {
    type Err = SubjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
