//! Typed property values and their conversions to Rust field types

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

pub(crate) const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Wire tag for each [`PropertyValue`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueTag {
    Null = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Double = 4,
    String = 5,
    Bytes = 6,
    Duration = 7,
    Timestamp = 8,
    Json = 9,
}

impl ValueTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Null,
            1 => Self::Bool,
            2 => Self::Int32,
            3 => Self::Int64,
            4 => Self::Double,
            5 => Self::String,
            6 => Self::Bytes,
            7 => Self::Duration,
            8 => Self::Timestamp,
            9 => Self::Json,
            _ => return None,
        })
    }
}

/// A single value in a message's property bag.
///
/// Durations are signed nanosecond counts so that intervals share their
/// unit with timestamps, which are nanoseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Duration(i64),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl PropertyValue {
    pub fn tag(&self) -> ValueTag {
        match self {
            PropertyValue::Null => ValueTag::Null,
            PropertyValue::Bool(_) => ValueTag::Bool,
            PropertyValue::Int32(_) => ValueTag::Int32,
            PropertyValue::Int64(_) => ValueTag::Int64,
            PropertyValue::Double(_) => ValueTag::Double,
            PropertyValue::String(_) => ValueTag::String,
            PropertyValue::Bytes(_) => ValueTag::Bytes,
            PropertyValue::Duration(_) => ValueTag::Duration,
            PropertyValue::Timestamp(_) => ValueTag::Timestamp,
            PropertyValue::Json(_) => ValueTag::Json,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Split a nanosecond duration into the `(seconds, subsecond nanos)`
    /// pair written on the wire. The nanos part is always non-negative.
    pub fn split_duration(nanos: i64) -> (i64, i32) {
        (
            nanos.div_euclid(NANOS_PER_SECOND),
            nanos.rem_euclid(NANOS_PER_SECOND) as i32,
        )
    }

    /// Inverse of [`PropertyValue::split_duration`]. Fails instead of
    /// wrapping when the pair does not fit in an `i64` nanosecond count.
    pub fn join_duration(seconds: i64, nanos: i32) -> CoreResult<i64> {
        if !(0..NANOS_PER_SECOND as i32).contains(&nanos) {
            return Err(CoreError::malformed(format!(
                "duration nanos {} outside [0, 1e9)",
                nanos
            )));
        }
        let total = seconds as i128 * NANOS_PER_SECOND as i128 + nanos as i128;
        i64::try_from(total).map_err(|_| {
            CoreError::malformed(format!(
                "duration {}s {}ns overflows a 64-bit nanosecond count",
                seconds, nanos
            ))
        })
    }
}

/// Conversion between a typed message field and its property value.
///
/// Typed messages store every optional field as `Option<T>`; `None` is
/// never written, and a `Null` value reads back as `None`.
pub trait PropertyField: Sized {
    fn to_property(self) -> CoreResult<PropertyValue>;
    fn from_property(key: &str, value: PropertyValue) -> CoreResult<Self>;
}

fn type_mismatch<T>(key: &str, expected: ValueTag, found: &PropertyValue) -> CoreResult<T> {
    Err(CoreError::malformed(format!(
        "property '{}' expected {:?}, found {:?}",
        key,
        expected,
        found.tag()
    )))
}

macro_rules! simple_field {
    ($ty:ty, $variant:ident) => {
        impl PropertyField for $ty {
            fn to_property(self) -> CoreResult<PropertyValue> {
                Ok(PropertyValue::$variant(self))
            }

            fn from_property(key: &str, value: PropertyValue) -> CoreResult<Self> {
                match value {
                    PropertyValue::$variant(v) => Ok(v),
                    other => type_mismatch(key, ValueTag::$variant, &other),
                }
            }
        }
    };
}

simple_field!(bool, Bool);
simple_field!(i32, Int32);
simple_field!(i64, Int64);
simple_field!(f64, Double);
simple_field!(String, String);
simple_field!(Vec<u8>, Bytes);
simple_field!(DateTime<Utc>, Timestamp);
simple_field!(serde_json::Value, Json);

/// Identifiers (`ClientId`, `RequestId`, `WorkerId`...) travel as Int64 and
/// must fit in 32 bits.
impl PropertyField for u32 {
    fn to_property(self) -> CoreResult<PropertyValue> {
        Ok(PropertyValue::Int64(self as i64))
    }

    fn from_property(key: &str, value: PropertyValue) -> CoreResult<Self> {
        match value {
            PropertyValue::Int64(v) => u32::try_from(v).map_err(|_| {
                CoreError::malformed(format!("property '{}' value {} out of u32 range", key, v))
            }),
            other => type_mismatch(key, ValueTag::Int64, &other),
        }
    }
}

/// Timeouts and intervals, as a signed nanosecond count.
///
/// Every `i64` nanosecond count decodes, negative ones included. Only a
/// `TimeDelta` beyond that range fails, and only when encoding.
impl PropertyField for TimeDelta {
    fn to_property(self) -> CoreResult<PropertyValue> {
        self.num_nanoseconds()
            .map(PropertyValue::Duration)
            .ok_or_else(|| CoreError::Encode(format!("interval {} exceeds i64 nanoseconds", self)))
    }

    fn from_property(key: &str, value: PropertyValue) -> CoreResult<Self> {
        match value {
            PropertyValue::Duration(nanos) => Ok(TimeDelta::nanoseconds(nanos)),
            other => type_mismatch(key, ValueTag::Duration, &other),
        }
    }
}

/// Convert a local timeout into the interval carried by typed messages
pub fn interval(duration: std::time::Duration) -> CoreResult<TimeDelta> {
    i64::try_from(duration.as_nanos())
        .map(TimeDelta::nanoseconds)
        .map_err(|_| CoreError::Encode(format!("duration {:?} exceeds i64 nanoseconds", duration)))
}

/// Implement [`PropertyField`] for a serde type carried as a JSON property.
#[macro_export]
macro_rules! json_property_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::protocol::PropertyField for $ty {
                fn to_property(self) -> $crate::CoreResult<$crate::protocol::PropertyValue> {
                    Ok($crate::protocol::PropertyValue::Json(::serde_json::to_value(self)?))
                }

                fn from_property(
                    key: &str,
                    value: $crate::protocol::PropertyValue,
                ) -> $crate::CoreResult<Self> {
                    match value {
                        $crate::protocol::PropertyValue::Json(json) => ::serde_json::from_value(json)
                            .map_err(|e| {
                                $crate::CoreError::MalformedMessage(format!(
                                    "property '{}' holds invalid JSON: {}",
                                    key, e
                                ))
                            }),
                        other => Err($crate::CoreError::MalformedMessage(format!(
                            "property '{}' expected Json, found {:?}",
                            key,
                            other.tag()
                        ))),
                    }
                }
            }
        )*
    };
}

/// Read a timestamp from its wire representation
pub(crate) fn timestamp_from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// Write a timestamp in its wire representation
pub(crate) fn timestamp_to_nanos(ts: &DateTime<Utc>) -> CoreResult<i64> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| CoreError::Encode(format!("timestamp {} outside the nanosecond range", ts)))
}
