//! CodecRegistry - tag ⇔ 型 ⇔ codec の対応を管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - TypeId による「型 → tag」の逆引き
//! - 起動時に構築（mutable）、実行時は読み取り専用（Arc で共有、ロック不要）

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::codec::{BoxError, DecodedMessage, DynCodec, FnCodec, JsonCodec, PayloadCodec, TypedCodec};
use super::message::Message;
use crate::domain::{CodecError, Envelope, RegistryError, Tag};

struct CodecEntry {
    tag: Tag,
    type_name: &'static str,
    codec: Arc<dyn DynCodec>,
}

/// CodecRegistry は message 型ごとの codec を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut codecs = CodecRegistry::new();
/// codecs.register::<Chat>()?;
///
/// let envelope = codecs.encode(&Chat { text: "hi".into() })?;
/// let decoded = codecs.decode(&envelope)?;
/// ```
#[derive(Default)]
pub struct CodecRegistry {
    by_tag: HashMap<Tag, CodecEntry>,
    by_type: HashMap<TypeId, Tag>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `M` with the JSON codec.
    pub fn register<M>(&mut self) -> Result<(), RegistryError>
    where
        M: Message + Serialize + DeserializeOwned,
    {
        self.register_with::<M, _>(JsonCodec)
    }

    /// Register `M` with a pair of encode/decode functions.
    pub fn register_fn<M, E, D>(&mut self, encode: E, decode: D) -> Result<(), RegistryError>
    where
        M: Message,
        E: Fn(&M) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<M, BoxError> + Send + Sync + 'static,
    {
        self.register_with::<M, _>(FnCodec::new(encode, decode))
    }

    /// Register `M` with any codec.
    ///
    /// Fails with `DuplicateTag` when `M::TAG` is taken; the existing entry is
    /// kept as it was.
    pub fn register_with<M, C>(&mut self, codec: C) -> Result<(), RegistryError>
    where
        M: Message,
        C: PayloadCodec<M>,
    {
        let tag = Tag::parse(M::TAG).map_err(|source| RegistryError::InvalidTag {
            tag: M::TAG.to_string(),
            source,
        })?;
        if let Some(existing) = self.by_tag.get(&tag) {
            return Err(RegistryError::DuplicateTag {
                tag,
                existing: existing.type_name,
            });
        }

        let entry = CodecEntry {
            tag: tag.clone(),
            type_name: M::type_name(),
            codec: Arc::new(TypedCodec::<M, C>::new(codec)),
        };
        self.by_type.insert(TypeId::of::<M>(), tag.clone());
        self.by_tag.insert(tag.clone(), entry);

        tracing::info!(tag = %tag, type_name = M::type_name(), "registered message type");
        Ok(())
    }

    /// Encode a message into an envelope tagged with `message.tag()`.
    pub fn encode<M: Message>(&self, message: &M) -> Result<Envelope, CodecError> {
        let entry = self
            .by_type
            .get(&TypeId::of::<M>())
            .and_then(|tag| self.by_tag.get(tag))
            .ok_or(CodecError::UnregisteredType {
                type_name: M::type_name(),
            })?;

        let body = entry
            .codec
            .encode_any(message as &dyn Any)
            .map_err(|e| CodecError::Encode {
                tag: entry.tag.clone(),
                reason: e.to_string(),
            })?;
        if body.len() > u32::MAX as usize {
            return Err(CodecError::Encode {
                tag: entry.tag.clone(),
                reason: format!("body of {} bytes does not fit the frame", body.len()),
            });
        }
        Ok(Envelope::new(entry.tag.clone(), body))
    }

    /// Decode an envelope with the codec registered for its tag.
    pub fn decode(&self, envelope: &Envelope) -> Result<DecodedMessage, CodecError> {
        let tag = envelope.tag();
        let entry = self
            .by_tag
            .get(tag)
            .ok_or_else(|| CodecError::UnknownTag(tag.clone()))?;

        let payload = entry
            .codec
            .decode_any(envelope.body())
            .map_err(|e| malformed(tag, envelope.body().len(), e))?;
        Ok(DecodedMessage::new(tag.clone(), entry.type_name, payload))
    }

    /// Decode when the caller already knows the expected type.
    pub fn decode_as<M: Message>(&self, envelope: &Envelope) -> Result<Arc<M>, CodecError> {
        let decoded = self.decode(envelope)?;
        decoded.downcast::<M>().ok_or(CodecError::UnregisteredType {
            type_name: M::type_name(),
        })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn tag_of<M: Message>(&self) -> Option<&Tag> {
        self.by_type.get(&TypeId::of::<M>())
    }

    /// Registered tags, sorted.
    pub fn registered_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.by_tag.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

fn malformed(tag: &Tag, len: usize, error: BoxError) -> CodecError {
    CodecError::MalformedBody {
        tag: tag.clone(),
        len,
        reason: error.to_string(),
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("tags", &self.registered_tags())
            .finish()
    }
}
