//! Commy - アプリケーション境界
//!
//! Everything an embedding plugin calls after startup: subscribe,
//! unsubscribe, send and dispatch.

use std::sync::Arc;
use thiserror::Error;

use super::builder::CommyBuilder;
use super::dispatcher::{DispatchReport, Dispatcher};
use crate::config::CommyConfig;
use crate::domain::{CodecError, Envelope, ErrorKind, HandlerError, RegistryError, SubscriptionId};
use crate::observability::DispatchCounts;
use crate::ports::{Transport, TransportError};
use crate::typed::{CodecRegistry, Delivery, Handler, HandlerRegistry, Message};

/// Why `transmit` failed. [`SendError::kind`] tells the caller whether a
/// resend can help.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("no transport attached")]
    NoTransport,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SendError::Codec(e) => e.kind(),
            SendError::NoTransport => ErrorKind::Permanent,
            SendError::Transport(e) => e.kind(),
        }
    }
}

/// Commy は登録済みの codec と subscriber を束ねた実行時の本体
///
/// `Send + Sync`; share it with `Arc` between the dispatch loop and
/// application code.
pub struct Commy {
    codecs: Arc<CodecRegistry>,
    handlers: Arc<HandlerRegistry>,
    dispatcher: Dispatcher,
    transport: Option<Arc<dyn Transport>>,
    config: CommyConfig,
}

impl Commy {
    pub fn builder() -> CommyBuilder {
        CommyBuilder::new()
    }

    pub(crate) fn new(
        codecs: Arc<CodecRegistry>,
        handlers: Arc<HandlerRegistry>,
        config: CommyConfig,
        transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&codecs), Arc::clone(&handlers), &config);
        Self {
            codecs,
            handlers,
            dispatcher,
            transport,
            config,
        }
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn config(&self) -> &CommyConfig {
        &self.config
    }

    pub fn subscribe<M, H>(&self, handler: H) -> Result<SubscriptionId, RegistryError>
    where
        M: Message,
        H: Handler<M>,
    {
        self.handlers.subscribe::<M, H>(handler)
    }

    pub fn subscribe_fn<M, F>(&self, f: F) -> Result<SubscriptionId, RegistryError>
    where
        M: Message,
        F: Fn(&M, &Delivery) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.subscribe_fn::<M, F>(f)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handlers.unsubscribe(id)
    }

    /// Encode `message`, rejecting bodies larger than `frame.max_body_len`.
    pub fn encode<M: Message>(&self, message: &M) -> Result<Envelope, CodecError> {
        let envelope = self.codecs.encode(message)?;
        let max = self.config.frame.max_body_len;
        if envelope.body().len() > max as usize {
            return Err(CodecError::Encode {
                tag: envelope.tag().clone(),
                reason: format!("body of {} bytes exceeds the {max} byte frame limit", envelope.body().len()),
            });
        }
        Ok(envelope)
    }

    /// Encode and frame `message`, returning the bytes a transport should carry.
    pub fn send<M: Message>(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        Ok(self.encode(message)?.to_frame())
    }

    /// Encode, frame and hand `message` to the attached transport.
    pub async fn transmit<M: Message>(&self, message: &M) -> Result<(), SendError> {
        let frame = self.send(message)?;
        let transport = self.transport.as_ref().ok_or(SendError::NoTransport)?;
        let len = frame.len();
        transport.send(frame).await?;
        tracing::debug!(tag = message.tag(), len, "frame transmitted");
        Ok(())
    }

    pub async fn dispatch(&self, envelope: Envelope) -> DispatchReport {
        self.dispatcher.dispatch(envelope).await
    }

    pub async fn dispatch_bytes(&self, raw: &[u8]) -> DispatchReport {
        self.dispatcher.dispatch_bytes(raw).await
    }

    pub async fn dispatch_from(&self, origin: Option<Arc<str>>, raw: &[u8]) -> DispatchReport {
        self.dispatcher.dispatch_from(origin, raw).await
    }

    pub fn counts(&self) -> DispatchCounts {
        self.dispatcher.counts()
    }
}
