//! Domain model (tags, envelopes, ids, errors).

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod tag;

pub use self::envelope::{Envelope, FrameLimits};
pub use self::errors::{CodecError, ErrorKind, FrameError, HandlerError, RegistryError, TagError};
pub use self::ids::{Id, IdMarker, SubscriptionId};
pub use self::tag::{MAX_TAG_LEN, Tag};
