//! InMemoryLink - 開発用・テスト用の transport
//!
//! Two endpoints joined by tokio mpsc channels. Frames sent by one side show
//! up on the other side's inbound receiver, tagged with the sender's name as
//! origin.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ports::{InboundFrame, Transport, TransportError};

pub type Inbound = mpsc::Receiver<InboundFrame>;

#[derive(Debug, Clone)]
pub struct InMemoryLink {
    name: Arc<str>,
    peer: mpsc::Sender<InboundFrame>,
}

impl InMemoryLink {
    /// Build two connected endpoints named `a` and `b`.
    ///
    /// # 使用例
    /// ```ignore
    /// let ((lobby, _lobby_in), (proxy, proxy_in)) = InMemoryLink::pair("lobby", "proxy", 64);
    /// lobby.send(frame).await?; // proxy_in で受け取る
    /// ```
    pub fn pair(a: &str, b: &str, capacity: usize) -> ((InMemoryLink, Inbound), (InMemoryLink, Inbound)) {
        let capacity = capacity.max(1);
        let (to_a, a_inbound) = mpsc::channel(capacity);
        let (to_b, b_inbound) = mpsc::channel(capacity);

        let a_link = InMemoryLink {
            name: Arc::from(a),
            peer: to_b,
        };
        let b_link = InMemoryLink {
            name: Arc::from(b),
            peer: to_a,
        };
        ((a_link, a_inbound), (b_link, b_inbound))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Transport for InMemoryLink {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.peer
            .send(InboundFrame::new(Some(Arc::clone(&self.name)), frame))
            .await
            .map_err(|_| TransportError::Closed)
    }
}
