//! CommyBuilder - 起動フェーズでの登録とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 登録が終わったら CodecRegistry は Arc に包んで読み取り専用にする

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::runtime::Commy;
use crate::config::{CommyConfig, ConfigError};
use crate::domain::RegistryError;
use crate::ports::{IdGenerator, Transport};
use crate::typed::{BoxError, CodecRegistry, HandlerRegistry, Message, PayloadCodec};

/// CommyBuilder は Commy を構築
///
/// # 使用例
/// ```ignore
/// let commy = CommyBuilder::new()
///     .register::<Chat>()?
///     .expect_tags(&["chat"])
///     .transport(link)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tags() で期待される tag を宣言
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
pub struct CommyBuilder {
    codecs: CodecRegistry,
    expected_tags: Option<Vec<String>>,
    config: CommyConfig,
    transport: Option<Arc<dyn Transport>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing tags: {0:?}. These tags were expected but not registered.")]
    MissingTags(Vec<String>),

    #[error("tag '{tag}' is {len} bytes, frames allow at most {max}")]
    TagTooLong { tag: String, len: usize, max: u16 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CommyBuilder {
    pub fn new() -> Self {
        Self {
            codecs: CodecRegistry::new(),
            expected_tags: None,
            config: CommyConfig::default(),
            transport: None,
            id_generator: None,
        }
    }

    /// Register `M` with the JSON codec.
    pub fn register<M>(mut self) -> Result<Self, RegistryError>
    where
        M: Message + Serialize + DeserializeOwned,
    {
        self.codecs.register::<M>()?;
        Ok(self)
    }

    pub fn register_with<M, C>(mut self, codec: C) -> Result<Self, RegistryError>
    where
        M: Message,
        C: PayloadCodec<M>,
    {
        self.codecs.register_with::<M, C>(codec)?;
        Ok(self)
    }

    pub fn register_fn<M, E, D>(mut self, encode: E, decode: D) -> Result<Self, RegistryError>
    where
        M: Message,
        E: Fn(&M) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<M, BoxError> + Send + Sync + 'static,
    {
        self.codecs.register_fn::<M, E, D>(encode, decode)?;
        Ok(self)
    }

    /// Tags that must be registered by the time `build()` runs.
    pub fn expect_tags(mut self, tags: &[&str]) -> Self {
        self.expected_tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn config(mut self, config: CommyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Source of subscription handles (defaults to ULIDs on the system clock).
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(ids);
        self
    }

    pub fn build(self) -> Result<Commy, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_tags {
            let missing: Vec<String> = expected
                .iter()
                .filter(|tag| !self.codecs.contains(tag))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTags(missing));
            }
        }

        // 自分の dispatcher が受け取れない tag は送れないようにする
        let max = self.config.frame.max_tag_len;
        if let Some(tag) = self
            .codecs
            .registered_tags()
            .into_iter()
            .find(|tag| tag.len() > max as usize)
        {
            return Err(BuildError::TagTooLong {
                len: tag.len(),
                tag: tag.into(),
                max,
            });
        }

        let handlers = match self.id_generator {
            Some(ids) => HandlerRegistry::with_id_generator(ids),
            None => HandlerRegistry::new(),
        };

        tracing::info!(tags = ?self.codecs.registered_tags(), "commy core built");
        Ok(Commy::new(
            Arc::new(self.codecs),
            Arc::new(handlers),
            self.config,
            self.transport,
        ))
    }
}

impl Default for CommyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::TestMessage;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Other;

    impl Message for Other {
        const TAG: &'static str = "other";
    }

    #[test]
    fn test_build_success() {
        let commy = CommyBuilder::new()
            .register::<TestMessage>()
            .unwrap()
            .expect_tags(&[TestMessage::TAG])
            .build();
        assert!(commy.is_ok());
    }

    #[test]
    fn test_build_missing_tags() {
        let commy = CommyBuilder::new()
            .register::<TestMessage>()
            .unwrap()
            .expect_tags(&[TestMessage::TAG, Other::TAG])
            .build();
        assert!(matches!(
            commy,
            Err(BuildError::MissingTags(missing)) if missing == vec![Other::TAG.to_string()]
        ));
    }

    #[test]
    fn test_build_no_expect_tags() {
        let commy = CommyBuilder::new().register::<TestMessage>().unwrap().build();
        assert!(commy.is_ok());
    }

    #[test]
    fn test_duplicate_registration_fails_early() {
        let result = CommyBuilder::new()
            .register::<TestMessage>()
            .unwrap()
            .register::<TestMessage>();
        assert!(matches!(result, Err(RegistryError::DuplicateTag { .. })));
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut config = CommyConfig::default();
        config.frame.max_body_len = 0;
        let result = CommyBuilder::new().config(config).build();
        assert!(matches!(result, Err(BuildError::Config(ConfigError::Invalid(_)))));
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Verbose;

    impl Message for Verbose {
        const TAG: &'static str = "a_tag_that_is_longer_than_sixteen_bytes";
    }

    #[test]
    fn test_tag_longer_than_frame_limit_fails_build() {
        let mut config = CommyConfig::default();
        config.frame.max_tag_len = 16;
        let result = CommyBuilder::new()
            .config(config)
            .register::<TestMessage>()
            .unwrap()
            .register::<Verbose>()
            .unwrap()
            .build();
        assert!(matches!(
            result,
            Err(BuildError::TagTooLong { tag, len, max: 16 }) if tag == Verbose::TAG && len == Verbose::TAG.len()
        ));
    }

    #[test]
    fn test_tag_at_frame_limit_builds() {
        let mut config = CommyConfig::default();
        config.frame.max_tag_len = TestMessage::TAG.len() as u16;
        let result = CommyBuilder::new().config(config).register::<TestMessage>().unwrap().build();
        assert!(result.is_ok());
    }
}
