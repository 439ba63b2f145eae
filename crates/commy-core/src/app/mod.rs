//! App - アプリケーション層
//!
//! typed layer と ports を組み合わせて、実行時の振る舞いを実装します。
//!
//! # 主要コンポーネント
//! - **CommyBuilder**: 起動フェーズの登録と検証
//! - **Commy**: subscribe / send / dispatch の表面
//! - **Dispatcher**: decode と handler への配送
//! - **DispatchLoop**: inbound frame を 1 タスクで順に処理

pub mod builder;
pub mod dispatch_loop;
pub mod dispatcher;
pub mod runtime;

pub use self::builder::{BuildError, CommyBuilder};
pub use self::dispatch_loop::DispatchLoop;
pub use self::dispatcher::{DispatchReport, Dispatcher, DropReason};
pub use self::runtime::{Commy, SendError};
