//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部のもの（transport、時刻、ID 生成）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod id_generator;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::transport::{InboundFrame, Transport, TransportError};
