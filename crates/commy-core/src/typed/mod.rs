//! Typed - 型付き Message API
//!
//! tag の typo を型で排除し、codec / handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Message` trait, `PayloadCodec<M>`, `Handler<M>` - 型安全
//! - **内部（Dyn）**: `DynCodec`, `DynHandler` - object-safe, type erasure

pub mod codec;
pub mod handler;
pub mod message;
pub mod registry;
pub mod subscriptions;

pub use self::codec::{AnyMessage, BoxError, DecodedMessage, FnCodec, JsonCodec, PayloadCodec};
pub use self::handler::{Delivery, DynHandler, FnHandler, Handler, TypedHandler};
pub use self::message::{Message, TestMessage};
pub use self::registry::CodecRegistry;
pub use self::subscriptions::{HandlerRegistry, Subscriber};
