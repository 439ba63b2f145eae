//! commy-core
//!
//! Tagged-message dispatch core: payload types declare a tag, a codec
//! registry turns them into framed envelopes and back, and a dispatcher
//! routes decoded messages to subscribed handlers.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（tag, envelope, ids, errors）
//! - **typed**: 型付き Message API（Message trait, PayloadCodec, Handler, registries）
//! - **app**: アプリケーションロジック（builder, Commy, dispatcher, dispatch loop）
//! - **ports**: 抽象化レイヤー（Transport, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryLink など開発用）
//! - **config**: 実行時設定
//! - **observability**: dispatch カウンタ

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use app::{BuildError, Commy, CommyBuilder, DispatchLoop, DispatchReport, DropReason, SendError};
pub use config::{CommyConfig, ConfigError};
pub use domain::{CodecError, Envelope, FrameError, HandlerError, RegistryError, SubscriptionId, Tag};
pub use observability::DispatchCounts;
pub use typed::{Delivery, Handler, JsonCodec, Message, PayloadCodec};
