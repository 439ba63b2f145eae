//! Transport port - frame bytes の送受信
//!
//! The core never opens sockets or channels itself. Outbound frames go
//! through [`Transport::send`]; inbound frames arrive as [`InboundFrame`]s
//! on a tokio mpsc channel owned by whoever runs the transport.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::ErrorKind;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport failure: {0}")]
    Io(String),
}

impl TransportError {
    /// `Io` may succeed on resend; `Closed` needs a new link.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Closed => ErrorKind::Infrastructure,
            TransportError::Io(_) => ErrorKind::Transient,
        }
    }
}

/// One frame as received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub origin: Option<Arc<str>>,
    pub bytes: Vec<u8>,
}

impl InboundFrame {
    pub fn new(origin: Option<Arc<str>>, bytes: Vec<u8>) -> Self {
        Self { origin, bytes }
    }
}

/// Transport carries framed envelopes to the other side.
///
/// Implementations report failures as [`TransportError`] and do not retry;
/// the caller of `transmit` decides from [`TransportError::kind`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;
}
