//! Handler trait - 受信した Message を処理する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<M>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<M, H> → DynHandler)

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

use super::codec::AnyMessage;
use super::message::Message;
use crate::domain::{HandlerError, SubscriptionId, Tag};

/// Per-invocation context handed to every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    tag: Tag,
    origin: Option<Arc<str>>,
    subscription: SubscriptionId,
}

impl Delivery {
    pub fn new(tag: Tag, origin: Option<Arc<str>>, subscription: SubscriptionId) -> Self {
        Self {
            tag,
            origin,
            subscription,
        }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Peer the frame arrived from, when the transport knows it.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
}

/// Handler は decode 済みの Message を受け取る
///
/// # 使用例
/// ```ignore
/// struct ChatLogger;
///
/// #[async_trait]
/// impl Handler<Chat> for ChatLogger {
///     async fn handle(&self, message: &Chat, delivery: &Delivery) -> Result<(), HandlerError> {
///         println!("{:?}: {}", delivery.origin(), message.text);
///         Ok(())
///     }
/// }
/// ```
///
/// The returned error is only reported; it never stops delivery to the other
/// subscribers of the same tag.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync + 'static {
    async fn handle(&self, message: &M, delivery: &Delivery) -> Result<(), HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// HandlerRegistry は tag ごとに `Arc<dyn DynHandler>` の列を保持します。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, message: AnyMessage, delivery: Delivery) -> Result<(), HandlerError>;
    fn type_name(&self) -> &'static str;
}

pub struct TypedHandler<M: Message, H: Handler<M>> {
    handler: H,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message, H: Handler<M>> TypedHandler<M, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<M: Message, H: Handler<M>> DynHandler for TypedHandler<M, H> {
    async fn handle_dyn(&self, message: AnyMessage, delivery: Delivery) -> Result<(), HandlerError> {
        let message = message
            .downcast::<M>()
            .map_err(|_| HandlerError::TypeMismatch {
                expected: M::type_name(),
            })?;
        self.handler.handle(&message, &delivery).await
    }

    fn type_name(&self) -> &'static str {
        M::type_name()
    }
}

/// Adapter for plain synchronous closures.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<M, F> Handler<M> for FnHandler<F>
where
    M: Message,
    F: Fn(&M, &Delivery) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    async fn handle(&self, message: &M, delivery: &Delivery) -> Result<(), HandlerError> {
        (self.f)(message, delivery)
    }
}
