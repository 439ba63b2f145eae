//! Errors - エラー型と分類
//!
//! Registration errors go back to whoever registered; decode and frame
//! errors are produced by untrusted input and stop at the dispatcher;
//! handler errors are reported per handler and never propagate.

use thiserror::Error;

use super::tag::Tag;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（再送で直る可能性がある）
/// - Permanent: 恒久的なエラー（同じ bytes を再送しても無意味）
/// - Infrastructure: transport 側の障害
///
/// The core never retries. Callers of `Commy::transmit` use this to decide
/// whether to resend (`Transient`), reconnect (`Infrastructure`) or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("tag must not be empty")]
    Empty,

    #[error("tag is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("tag contains control character {0:?}")]
    ControlCharacter(char),
}

/// Problems found while parsing the `tag_len | tag | body_len | body` framing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("frame tag is {len} bytes, limit is {max}")]
    TagTooLong { len: usize, max: usize },

    #[error("frame body is {len} bytes, limit is {max}")]
    BodyTooLarge { len: usize, max: usize },

    #[error("frame tag is not valid UTF-8")]
    TagNotUtf8,

    #[error("frame tag rejected: {0}")]
    InvalidTag(#[from] TagError),

    #[error("{0} trailing bytes after frame body")]
    TrailingBytes(usize),
}

/// Registration-time errors. The registry is left unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tag '{tag}' is already registered for {existing}")]
    DuplicateTag { tag: Tag, existing: &'static str },

    #[error("invalid tag '{tag}': {source}")]
    InvalidTag {
        tag: String,
        #[source]
        source: TagError,
    },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message type {type_name} is not registered")]
    UnregisteredType { type_name: &'static str },

    #[error("no codec registered for tag '{0}'")]
    UnknownTag(Tag),

    #[error("malformed body for tag '{tag}' ({len} bytes): {reason}")]
    MalformedBody {
        tag: Tag,
        len: usize,
        reason: String,
    },

    #[error("failed to encode '{tag}': {reason}")]
    Encode { tag: Tag, reason: String },
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        // どれも同じ入力で再試行しても結果は変わらない
        ErrorKind::Permanent
    }
}

/// Failure of a single handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler expects {expected}, decoded message is a different type")]
    TypeMismatch { expected: &'static str },
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
