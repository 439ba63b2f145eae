//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryLink**: プロセス内で 2 つの peer をつなぐ transport
//!
//! 本番用の transport（plugin message channel, socket など）は
//! 組み込み側のアプリケーションが `Transport` を実装して渡します。

pub mod inmem_transport;

pub use self::inmem_transport::{InMemoryLink, Inbound};
