//! PayloadCodec - payload と body bytes の相互変換
//!
//! # 二層構造
//! - **表層（Typed）**: `PayloadCodec<M>` - 型ごとの encode/decode
//! - **内部（Dyn）**: `DynCodec` - object-safe, registry が tag 単位で保持

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::message::Message;
use crate::domain::Tag;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// PayloadCodec は 1 つの message 型の encode/decode を担当
///
/// Errors are reported as [`BoxError`]; the registry turns them into
/// `CodecError::Encode` / `CodecError::MalformedBody` with the tag attached.
pub trait PayloadCodec<M>: Send + Sync + 'static {
    fn encode(&self, message: &M) -> Result<Vec<u8>, BoxError>;
    fn decode(&self, body: &[u8]) -> Result<M, BoxError>;
}

/// Default codec: JSON via serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<M> PayloadCodec<M> for JsonCodec
where
    M: Serialize + DeserializeOwned,
{
    fn encode(&self, message: &M) -> Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, body: &[u8]) -> Result<M, BoxError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Codec built from a pair of plain functions.
pub struct FnCodec<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> FnCodec<E, D> {
    pub fn new(encode: E, decode: D) -> Self {
        Self { encode, decode }
    }
}

impl<M, E, D> PayloadCodec<M> for FnCodec<E, D>
where
    E: Fn(&M) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    D: Fn(&[u8]) -> Result<M, BoxError> + Send + Sync + 'static,
{
    fn encode(&self, message: &M) -> Result<Vec<u8>, BoxError> {
        (self.encode)(message)
    }

    fn decode(&self, body: &[u8]) -> Result<M, BoxError> {
        (self.decode)(body)
    }
}

pub type AnyMessage = Arc<dyn Any + Send + Sync>;

/// A decoded payload whose concrete type is only known through its tag.
#[derive(Clone)]
pub struct DecodedMessage {
    tag: Tag,
    type_name: &'static str,
    payload: AnyMessage,
}

impl DecodedMessage {
    pub(crate) fn new(tag: Tag, type_name: &'static str, payload: AnyMessage) -> Self {
        Self {
            tag,
            type_name,
            payload,
        }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Rust type name of the payload, as registered.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<M: Message>(&self) -> bool {
        self.payload.is::<M>()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    pub fn downcast<M: Message>(&self) -> Option<Arc<M>> {
        Arc::clone(&self.payload).downcast::<M>().ok()
    }

    pub(crate) fn payload(&self) -> &AnyMessage {
        &self.payload
    }
}

impl fmt::Debug for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedMessage")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// DynCodec は object-safe な codec の抽象化
pub(crate) trait DynCodec: Send + Sync {
    fn encode_any(&self, message: &dyn Any) -> Result<Vec<u8>, BoxError>;
    fn decode_any(&self, body: &[u8]) -> Result<AnyMessage, BoxError>;
}

pub(crate) struct TypedCodec<M, C> {
    codec: C,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message, C: PayloadCodec<M>> TypedCodec<M, C> {
    pub(crate) fn new(codec: C) -> Self {
        Self {
            codec,
            _marker: PhantomData,
        }
    }
}

impl<M: Message, C: PayloadCodec<M>> DynCodec for TypedCodec<M, C> {
    fn encode_any(&self, message: &dyn Any) -> Result<Vec<u8>, BoxError> {
        let message = message
            .downcast_ref::<M>()
            .ok_or_else(|| format!("expected {}", M::type_name()))?;
        self.codec.encode(message)
    }

    fn decode_any(&self, body: &[u8]) -> Result<AnyMessage, BoxError> {
        let message: AnyMessage = Arc::new(PayloadCodec::<M>::decode(&self.codec, body)?);
        Ok(message)
    }
}
