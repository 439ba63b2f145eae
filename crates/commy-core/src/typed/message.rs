//! Message trait - tag と型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const TAG`)
//! - `Any` による型消去（registry 側で TypeId を使う）

use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};

/// Message は routable な payload 型
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Chat {
///     text: String,
/// }
///
/// impl Message for Chat {
///     const TAG: &'static str = "chat";
/// }
/// ```
///
/// The tag is fixed per type for the lifetime of the process. Serialization
/// is not part of this trait: the codec registered for the type decides it.
pub trait Message: Any + Send + Sync + 'static {
    const TAG: &'static str;

    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn type_name() -> &'static str {
        type_name::<Self>()
    }
}

/// The two-field payload used by the plugin fixtures (`"test_msg"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMessage {
    pub name: String,
    pub id: i32,
}

impl TestMessage {
    pub fn new(name: impl Into<String>, id: i32) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl Message for TestMessage {
    const TAG: &'static str = "test_msg";
}
