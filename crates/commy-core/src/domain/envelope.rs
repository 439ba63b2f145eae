//! Envelope - tag + serialized body, the unit carried by a transport.
//!
//! # Wire framing
//! ```text
//! +-----------------+------------+------------------+------------+
//! | tag_len: u16 BE | tag: UTF-8 | body_len: u32 BE | body bytes |
//! +-----------------+------------+------------------+------------+
//! ```

use serde::{Deserialize, Serialize};

use super::errors::FrameError;
use super::tag::Tag;

const TAG_LEN_BYTES: usize = 2;
const BODY_LEN_BYTES: usize = 4;

/// Size limits enforced when parsing inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLimits {
    pub max_tag_len: u16,
    pub max_body_len: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_tag_len: 255,
            max_body_len: 1024 * 1024,
        }
    }
}

/// Envelope は tag と payload body の組
///
/// 一度作られたら変更されない（フィールドは private）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    tag: Tag,
    body: Vec<u8>,
}

impl Envelope {
    pub fn new(tag: Tag, body: Vec<u8>) -> Self {
        Self { tag, body }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_parts(self) -> (Tag, Vec<u8>) {
        (self.tag, self.body)
    }

    /// Length of the frame produced by [`Envelope::to_frame`].
    pub fn frame_len(&self) -> usize {
        TAG_LEN_BYTES + self.tag.len() + BODY_LEN_BYTES + self.body.len()
    }

    /// Serialize to wire bytes.
    ///
    /// Tags are capped at `u16::MAX` bytes by [`Tag`] validation. Bodies are
    /// expected to stay under `u32::MAX`; the codec layer enforces that.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.frame_len());
        out.extend_from_slice(&(self.tag.len() as u16).to_be_bytes());
        out.extend_from_slice(self.tag.as_str().as_bytes());
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse wire bytes into an envelope. The whole slice must be one frame.
    pub fn from_frame(bytes: &[u8], limits: &FrameLimits) -> Result<Self, FrameError> {
        let mut cursor = Cursor::new(bytes);

        let tag_len = u16::from_be_bytes(cursor.take_array::<TAG_LEN_BYTES>()?) as usize;
        if tag_len > limits.max_tag_len as usize {
            return Err(FrameError::TagTooLong {
                len: tag_len,
                max: limits.max_tag_len as usize,
            });
        }
        let tag_bytes = cursor.take(tag_len)?;
        let tag = std::str::from_utf8(tag_bytes).map_err(|_| FrameError::TagNotUtf8)?;
        let tag = Tag::parse(tag)?;

        let body_len = u32::from_be_bytes(cursor.take_array::<BODY_LEN_BYTES>()?) as usize;
        if body_len > limits.max_body_len as usize {
            return Err(FrameError::BodyTooLarge {
                len: body_len,
                max: limits.max_body_len as usize,
            });
        }
        let body = cursor.take(body_len)?.to_vec();

        let rest = cursor.remaining();
        if rest > 0 {
            return Err(FrameError::TrailingBytes(rest));
        }
        Ok(Self { tag, body })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        if self.remaining() < n {
            return Err(FrameError::Truncated {
                needed: self.pos + n,
                available: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::TagError;
    use rstest::rstest;

    fn envelope(tag: &str, body: &[u8]) -> Envelope {
        Envelope::new(Tag::parse(tag).unwrap(), body.to_vec())
    }

    #[test]
    fn frame_layout_is_length_prefixed() {
        let frame = envelope("ab", b"xyz").to_frame();
        assert_eq!(frame, vec![0, 2, b'a', b'b', 0, 0, 0, 3, b'x', b'y', b'z']);
    }

    #[test]
    fn frame_roundtrip_keeps_tag_and_body() {
        let env = envelope("test_msg", br#"{"name":"alpha","id":7}"#);
        let parsed = Envelope::from_frame(&env.to_frame(), &FrameLimits::default()).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(env.frame_len(), env.to_frame().len());
    }

    #[test]
    fn empty_body_is_allowed() {
        let env = envelope("ping", b"");
        let parsed = Envelope::from_frame(&env.to_frame(), &FrameLimits::default()).unwrap();
        assert!(parsed.body().is_empty());
    }

    #[rstest]
    #[case::no_bytes(vec![], FrameError::Truncated { needed: 2, available: 0 })]
    #[case::half_tag_len(vec![0], FrameError::Truncated { needed: 2, available: 1 })]
    #[case::short_tag(vec![0, 4, b'a', b'b'], FrameError::Truncated { needed: 6, available: 4 })]
    #[case::missing_body_len(vec![0, 1, b'a', 0, 0], FrameError::Truncated { needed: 7, available: 5 })]
    #[case::short_body(vec![0, 1, b'a', 0, 0, 0, 5, 1, 2], FrameError::Truncated { needed: 12, available: 9 })]
    #[case::empty_tag(vec![0, 0, 0, 0, 0, 0], FrameError::InvalidTag(TagError::Empty))]
    #[case::non_utf8_tag(vec![0, 1, 0xff, 0, 0, 0, 0], FrameError::TagNotUtf8)]
    #[case::trailing(vec![0, 1, b'a', 0, 0, 0, 1, 9, 9, 9], FrameError::TrailingBytes(2))]
    fn malformed_frames_are_rejected(#[case] frame: Vec<u8>, #[case] expected: FrameError) {
        let err = Envelope::from_frame(&frame, &FrameLimits::default()).unwrap_err();
        assert_eq!(err, expected);
    }

    #[test]
    fn limits_are_enforced_before_reading_payload() {
        let limits = FrameLimits {
            max_tag_len: 4,
            max_body_len: 2,
        };

        let long_tag = envelope("too_long", b"").to_frame();
        assert_eq!(
            Envelope::from_frame(&long_tag, &limits).unwrap_err(),
            FrameError::TagTooLong { len: 8, max: 4 }
        );

        let big_body = envelope("ok", b"abc").to_frame();
        assert_eq!(
            Envelope::from_frame(&big_body, &limits).unwrap_err(),
            FrameError::BodyTooLarge { len: 3, max: 2 }
        );
    }
}
