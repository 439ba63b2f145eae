use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::runtime::Commy;
use crate::ports::InboundFrame;

/// Dispatch loop handle.
/// - inbound frame を 1 つのタスクで順番に dispatch する
/// - `shutdown_tx` を drop するとループは止まる
/// - inbound 側の sender が全部 drop されても止まる
pub struct DispatchLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatchLoop {
    pub fn spawn(commy: Arc<Commy>, inbound: mpsc::Receiver<InboundFrame>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(dispatch_loop(commy, inbound, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Stop taking new frames. A dispatch already in progress finishes.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait until the inbound channel closes.
    pub async fn join(self) {
        let DispatchLoop { shutdown_tx, join } = self;
        if let Err(e) = join.await {
            tracing::error!(error = %e, "dispatch loop task failed");
        }
        drop(shutdown_tx);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}

async fn dispatch_loop(
    commy: Arc<Commy>,
    mut inbound: mpsc::Receiver<InboundFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!("dispatch loop started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let frame = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // 変更が入ったら次のループで判定
                continue;
            }
            frame = inbound.recv() => frame,
        };

        let Some(frame) = frame else {
            break;
        };
        commy.dispatch_from(frame.origin, &frame.bytes).await;
    }
    tracing::info!("dispatch loop stopped");
}
