//! The untyped message envelope

use super::error::ProxyError;
use super::message_type::MessageType;
use super::value::{PropertyField, PropertyValue};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;

/// Property keys shared by every message
pub mod keys {
    pub const CLIENT_ID: &str = "ClientId";
    pub const REQUEST_ID: &str = "RequestId";
    pub const ERROR: &str = "Error";
}

/// A decoded proxy frame.
///
/// Properties are kept in key order so that encoding is deterministic.
/// Attachments distinguish `None` (null) from `Some(vec![])` (empty).
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyMessage {
    pub message_type: MessageType,
    pub properties: BTreeMap<String, PropertyValue>,
    pub attachments: Vec<Option<Vec<u8>>>,
}

impl ProxyMessage {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            properties: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }

    /// The empty reply answering `request`, with its ids copied over
    pub fn reply_to(request: &ProxyMessage) -> CoreResult<Self> {
        let reply_type = request.message_type.reply_type().ok_or_else(|| {
            CoreError::malformed(format!("{} is not a request", request.message_type))
        })?;
        let mut reply = Self::new(reply_type);
        reply.set_client_id(request.client_id()?);
        reply.set_request_id(request.request_id()?);
        Ok(reply)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    /// Write an optional typed field; `None` leaves the key absent
    pub fn set_field<T: PropertyField>(&mut self, key: &str, value: Option<T>) -> CoreResult<()> {
        if let Some(value) = value {
            self.properties
                .insert(key.to_string(), value.to_property()?);
        }
        Ok(())
    }

    /// Remove and convert a typed field. Absent and `Null` both read as `None`.
    pub fn take_field<T: PropertyField>(&mut self, key: &str) -> CoreResult<Option<T>> {
        match self.properties.remove(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(value) => T::from_property(key, value).map(Some),
        }
    }

    /// Read a typed field without consuming it
    pub fn field<T: PropertyField>(&self, key: &str) -> CoreResult<Option<T>> {
        match self.properties.get(key) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(value) => T::from_property(key, value.clone()).map(Some),
        }
    }

    /// `ClientId`, or 0 when unset
    pub fn client_id(&self) -> CoreResult<u32> {
        Ok(self.field::<u32>(keys::CLIENT_ID)?.unwrap_or(0))
    }

    /// `RequestId`, or 0 when unset
    pub fn request_id(&self) -> CoreResult<u32> {
        Ok(self.field::<u32>(keys::REQUEST_ID)?.unwrap_or(0))
    }

    pub fn set_client_id(&mut self, client_id: u32) {
        self.set(keys::CLIENT_ID, PropertyValue::Int64(client_id as i64));
    }

    pub fn set_request_id(&mut self, request_id: u32) {
        self.set(keys::REQUEST_ID, PropertyValue::Int64(request_id as i64));
    }

    /// The error reported by a reply, if any
    pub fn error(&self) -> CoreResult<Option<ProxyError>> {
        self.field::<ProxyError>(keys::ERROR)
    }

    pub fn set_error(&mut self, error: ProxyError) -> CoreResult<()> {
        self.set_field(keys::ERROR, Some(error))
    }

    /// Fail unless this message has the given type
    pub fn expect_type(&self, expected: MessageType) -> CoreResult<()> {
        if self.message_type == expected {
            Ok(())
        } else {
            Err(CoreError::UnexpectedMessageType {
                expected,
                actual: self.message_type,
            })
        }
    }
}
