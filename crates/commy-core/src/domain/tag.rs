//! Tag - routing identifier of a message variant.
//!
//! A tag is the only thing the receiving side needs to know in order to find
//! the codec and the handlers for a payload. It travels in front of every
//! body on the wire (see [`Envelope`](super::Envelope)).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use super::errors::TagError;

/// Longest tag the wire framing can carry (`tag_len` is a `u16`).
pub const MAX_TAG_LEN: usize = u16::MAX as usize;

/// Tag は message variant を一意に識別する文字列
///
/// # 制約
/// - 空文字列は不可
/// - `MAX_TAG_LEN` バイト以下
/// - ASCII 制御文字を含まない
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Validate and wrap a tag.
    pub fn parse(value: impl Into<String>) -> Result<Self, TagError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn validate(value: &str) -> Result<(), TagError> {
        if value.is_empty() {
            return Err(TagError::Empty);
        }
        if value.len() > MAX_TAG_LEN {
            return Err(TagError::TooLong {
                len: value.len(),
                max: MAX_TAG_LEN,
            });
        }
        if let Some(c) = value.chars().find(|c| c.is_ascii_control()) {
            return Err(TagError::ControlCharacter(c));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated tag; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Tag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for Tag {
    type Error = TagError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl PartialEq<str> for Tag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Tag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
