use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{Duration, timeout};
use tracing_subscriber::EnvFilter;

use commy_core::impls::InMemoryLink;
use commy_core::typed::TestMessage;
use commy_core::{Commy, CommyConfig, DispatchLoop, HandlerError, Message};

/// 2 つ目の message 型（lobby → proxy の状態通知）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerStatus {
    server: String,
    players: u32,
}

impl Message for ServerStatus {
    const TAG: &'static str = "server_status";
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) 設定（引数で JSON ファイルを渡せる）
    let config = match std::env::args().nth(1) {
        Some(path) => CommyConfig::from_path(path)?,
        None => CommyConfig::default(),
    };

    // (B) 2 つの peer をメモリ上でつなぐ
    let ((lobby_link, _lobby_in), (proxy_link, proxy_in)) =
        InMemoryLink::pair("lobby", "proxy", config.inbound_capacity);

    let lobby = Commy::builder()
        .config(config.clone())
        .register::<TestMessage>()?
        .register::<ServerStatus>()?
        .transport(lobby_link)
        .build()?;

    let proxy = Arc::new(
        Commy::builder()
            .config(config)
            .register::<TestMessage>()?
            .register::<ServerStatus>()?
            .expect_tags(&[TestMessage::TAG, ServerStatus::TAG])
            .transport(proxy_link)
            .build()?,
    );

    // (C) 受信側で subscribe
    proxy.subscribe_fn::<TestMessage, _>(|message, delivery| {
        println!(
            "[{}] {} name={} id={}",
            delivery.origin().unwrap_or("?"),
            delivery.tag(),
            message.name,
            message.id
        );
        Ok(())
    })?;
    proxy.subscribe_fn::<ServerStatus, _>(|status, _| {
        if status.players > 100 {
            return Err(HandlerError::failed(format!("{} is overloaded", status.server)));
        }
        println!("{} has {} players", status.server, status.players);
        Ok(())
    })?;

    // (D) 受信ループを起動して送信
    let dispatch_loop = DispatchLoop::spawn(proxy.clone(), proxy_in);

    lobby.transmit(&TestMessage::new("alpha", 7)).await?;
    lobby
        .transmit(&ServerStatus {
            server: "survival-1".into(),
            players: 12,
        })
        .await?;
    lobby
        .transmit(&ServerStatus {
            server: "minigames".into(),
            players: 250,
        })
        .await?;

    // (E) 送信側を閉じると受信ループは drain して終わる
    drop(lobby);
    if timeout(Duration::from_secs(5), dispatch_loop.join()).await.is_err() {
        tracing::warn!("dispatch loop did not finish in time");
    }

    println!("counts: {}", serde_json::to_string(&proxy.counts())?);
    Ok(())
}
