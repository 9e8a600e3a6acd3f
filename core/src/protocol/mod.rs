//! The SDK ↔ proxy wire protocol

pub mod codec;
pub mod error;
pub mod message;
pub mod message_type;
pub mod messages;
pub mod value;

pub use codec::{MessageCodec, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE, MIN_FRAME_SIZE};
pub use error::{ProxyError, ProxyErrorKind};
pub use message::{keys, ProxyMessage};
pub use message_type::MessageType;
pub use messages::{ProxyReply, ProxyRequest, TypedMessage};
pub use value::{interval, PropertyField, PropertyValue, ValueTag};
