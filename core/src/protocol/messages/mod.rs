//! Typed request and reply messages
//!
//! Each struct is a view over a [`ProxyMessage`]: the well-known properties
//! become fields, and anything else lands in `extensions` so that values
//! added by a newer proxy survive a decode/encode cycle.

mod activity;
mod global;
mod workflow;

pub use activity::*;
pub use global::*;
pub use workflow::*;

use super::error::ProxyError;
use super::message::ProxyMessage;
use super::message_type::MessageType;
use crate::error::CoreResult;

/// A message with a fixed type tag and a lossless conversion to and from
/// the untyped envelope.
pub trait TypedMessage: Sized + Clone + Send + 'static {
    const TYPE: MessageType;

    fn client_id(&self) -> u32;
    fn request_id(&self) -> u32;
    fn set_client_id(&mut self, client_id: u32);
    fn set_request_id(&mut self, request_id: u32);

    fn into_message(self) -> CoreResult<ProxyMessage>;
    fn try_from_message(message: ProxyMessage) -> CoreResult<Self>;
}

/// A request together with the reply type it is answered by
pub trait ProxyRequest: TypedMessage {
    type Reply: ProxyReply;
}

/// A reply, which reports failures through its `Error` property
pub trait ProxyReply: TypedMessage {
    fn error(&self) -> Option<&ProxyError>;
    fn set_error(&mut self, error: ProxyError);

    /// Split a reply into its payload or the error it carries
    fn into_result(mut self) -> Result<Self, ProxyError> {
        match self.take_error() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    fn take_error(&mut self) -> Option<ProxyError>;
}

macro_rules! typed_message_body {
    ($name:ident, [$($extra:ident),*], { $( $key:literal => $field:ident : $fty:ty ),* }) => {
        impl $crate::protocol::messages::TypedMessage for $name {
            const TYPE: $crate::protocol::MessageType = $crate::protocol::MessageType::$name;

            fn client_id(&self) -> u32 {
                self.client_id
            }

            fn request_id(&self) -> u32 {
                self.request_id
            }

            fn set_client_id(&mut self, client_id: u32) {
                self.client_id = client_id;
            }

            fn set_request_id(&mut self, request_id: u32) {
                self.request_id = request_id;
            }

            fn into_message(self) -> $crate::CoreResult<$crate::protocol::ProxyMessage> {
                let mut message = $crate::protocol::ProxyMessage::new(Self::TYPE);
                message.properties = self.extensions;
                message.set_client_id(self.client_id);
                message.set_request_id(self.request_id);
                $( message.set_field($crate::protocol::keys::ERROR, self.$extra)?; )*
                $( message.set_field($key, self.$field)?; )*
                message.attachments = self.attachments;
                Ok(message)
            }

            fn try_from_message(mut message: $crate::protocol::ProxyMessage) -> $crate::CoreResult<Self> {
                message.expect_type(Self::TYPE)?;
                let client_id = message
                    .take_field::<u32>($crate::protocol::keys::CLIENT_ID)?
                    .unwrap_or(0);
                let request_id = message
                    .take_field::<u32>($crate::protocol::keys::REQUEST_ID)?
                    .unwrap_or(0);
                $( let $extra = message.take_field::<$crate::protocol::ProxyError>($crate::protocol::keys::ERROR)?; )*
                $( let $field = message.take_field::<$fty>($key)?; )*
                Ok(Self {
                    client_id,
                    request_id,
                    $( $extra, )*
                    $( $field, )*
                    extensions: message.properties,
                    attachments: message.attachments,
                })
            }
        }
    };
}

/// Declare a request struct and pair it with its reply.
macro_rules! proxy_request {
    (
        $(#[$meta:meta])*
        $name:ident => $reply:ident {
            $( $(#[$fmeta:meta])* $key:literal => $field:ident : $fty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub client_id: u32,
            pub request_id: u32,
            $( $(#[$fmeta])* pub $field: Option<$fty>, )*
            /// Properties this SDK does not know about
            pub extensions: std::collections::BTreeMap<String, $crate::protocol::PropertyValue>,
            pub attachments: Vec<Option<Vec<u8>>>,
        }

        $crate::protocol::messages::typed_message_body!($name, [], { $( $key => $field : $fty ),* });

        impl $crate::protocol::messages::ProxyRequest for $name {
            type Reply = $reply;
        }
    };
}

/// Declare a reply struct; every reply has an optional `error`.
macro_rules! proxy_reply {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $key:literal => $field:ident : $fty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            pub client_id: u32,
            pub request_id: u32,
            pub error: Option<$crate::protocol::ProxyError>,
            $( $(#[$fmeta])* pub $field: Option<$fty>, )*
            /// Properties this SDK does not know about
            pub extensions: std::collections::BTreeMap<String, $crate::protocol::PropertyValue>,
            pub attachments: Vec<Option<Vec<u8>>>,
        }

        $crate::protocol::messages::typed_message_body!($name, [error], { $( $key => $field : $fty ),* });

        impl $crate::protocol::messages::ProxyReply for $name {
            fn error(&self) -> Option<&$crate::protocol::ProxyError> {
                self.error.as_ref()
            }

            fn set_error(&mut self, error: $crate::protocol::ProxyError) {
                self.error = Some(error);
            }

            fn take_error(&mut self) -> Option<$crate::protocol::ProxyError> {
                self.error.take()
            }
        }
    };
}

pub(crate) use {proxy_reply, proxy_request, typed_message_body};
