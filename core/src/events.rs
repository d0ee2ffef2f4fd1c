//! The event interface between JSON producers and validators.
//!
//! A JSON value is delivered as a sequence of calls on a [`Consumer`]. Arrays
//! and objects are bracketed by `begin_*`/`end_*`; [`Consumer::element`] follows
//! every array element and [`Consumer::member`] follows every object member
//! value, so `[1, {"a": null}]` arrives as:
//!
//! ```text
//! begin_array
//!   number(1) element
//!   begin_object key("a") null member end_object element
//! end_array
//! ```
//!
//! Two producers are provided: [`from_value`] walks an in-memory
//! [`serde_json::Value`], and [`from_deserializer`] (with the [`from_reader`]
//! and [`from_str`] shorthands) drives any serde deserializer directly into a
//! consumer without building a value first.

use std::fmt;
use std::io::Read;

use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Value;

use crate::number::Number;

/// Receiver of JSON events.
///
/// Producers must deliver events in well-formed nesting order; implementors
/// are free to assume it.
pub trait Consumer {
    fn null(&mut self);
    fn boolean(&mut self, value: bool);
    fn number(&mut self, value: Number);
    fn string(&mut self, value: &str);
    fn binary(&mut self, value: &[u8]);
    fn begin_array(&mut self);
    fn element(&mut self);
    fn end_array(&mut self);
    fn begin_object(&mut self);
    fn key(&mut self, name: &str);
    fn member(&mut self);
    fn end_object(&mut self);
}

/// Feeds `value` into `consumer` as a complete event sequence.
pub fn from_value<C: Consumer + ?Sized>(consumer: &mut C, value: &Value) {
    match value {
        Value::Null => consumer.null(),
        Value::Bool(b) => consumer.boolean(*b),
        Value::Number(n) => consumer.number(Number::from_json(n)),
        Value::String(s) => consumer.string(s),
        Value::Array(items) => {
            consumer.begin_array();
            for item in items {
                from_value(consumer, item);
                consumer.element();
            }
            consumer.end_array();
        }
        Value::Object(members) => {
            consumer.begin_object();
            for (key, item) in members {
                consumer.key(key);
                from_value(consumer, item);
                consumer.member();
            }
            consumer.end_object();
        }
    }
}

/// Drives a serde deserializer straight into `consumer`.
///
/// Object members are delivered in document order and duplicate keys are
/// passed through, which an in-memory [`Value`] could not preserve.
///
/// # Errors
///
/// Returns the deserializer's error if the input is not well-formed; events
/// already delivered are not retracted, so the consumer should be discarded.
pub fn from_deserializer<'de, D, C>(deserializer: D, consumer: &mut C) -> Result<(), D::Error>
where
    D: Deserializer<'de>,
    C: Consumer + ?Sized,
{
    EventSeed(consumer).deserialize(deserializer)
}

/// Parses JSON text from `reader` into `consumer`, rejecting trailing input.
///
/// # Errors
///
/// Returns [`serde_json::Error`] on I/O failure or malformed JSON.
pub fn from_reader<R: Read, C: Consumer + ?Sized>(
    reader: R,
    consumer: &mut C,
) -> serde_json::Result<()> {
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    from_deserializer(&mut deserializer, consumer)?;
    deserializer.end()
}

/// Parses JSON text into `consumer`, rejecting trailing input.
///
/// # Errors
///
/// Returns [`serde_json::Error`] on malformed JSON.
pub fn from_str<C: Consumer + ?Sized>(text: &str, consumer: &mut C) -> serde_json::Result<()> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    from_deserializer(&mut deserializer, consumer)?;
    deserializer.end()
}

struct EventSeed<'a, C: ?Sized>(&'a mut C);

impl<'de, C: Consumer + ?Sized> DeserializeSeed<'de> for EventSeed<'_, C> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(EventVisitor(self.0))
    }
}

struct EventVisitor<'a, C: ?Sized>(&'a mut C);

impl<'de, C: Consumer + ?Sized> Visitor<'de> for EventVisitor<'_, C> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.0.null();
        Ok(())
    }

    fn visit_none<E: de::Error>(self) -> Result<(), E> {
        self.0.null();
        Ok(())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<(), E> {
        self.0.boolean(value);
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<(), E> {
        self.0.number(if value < 0 {
            Number::Signed(value)
        } else {
            Number::Unsigned(value as u64)
        });
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<(), E> {
        self.0.number(Number::Unsigned(value));
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<(), E> {
        self.0.number(Number::Double(value));
        Ok(())
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<(), E> {
        self.0.string(value);
        Ok(())
    }

    fn visit_bytes<E: de::Error>(self, value: &[u8]) -> Result<(), E> {
        self.0.binary(value);
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let consumer = self.0;
        consumer.begin_array();
        while seq.next_element_seed(EventSeed(&mut *consumer))?.is_some() {
            consumer.element();
        }
        consumer.end_array();
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let consumer = self.0;
        consumer.begin_object();
        while let Some(key) = map.next_key::<String>()? {
            consumer.key(&key);
            map.next_value_seed(EventSeed(&mut *consumer))?;
            consumer.member();
        }
        consumer.end_object();
        Ok(())
    }
}
