/*!
The [`Event`] type.

An event is an object describing something that happened in an application. Every event carries an `event` type name, like `log` or `ops`, and a `timestamp` in milliseconds since the Unix epoch. Everything else depends on the type of event.
*/

use serde::{de, Deserialize, Deserializer};

use crate::{
    path,
    value::{Number, Object, Value},
};

/**
A telemetry event.

Events are read-only while they're being encoded.
*/
#[derive(Clone, Default)]
pub struct Event(Object);

impl Event {
    pub fn new(fields: Object) -> Self {
        Event(fields)
    }

    /**
    Get the value at a dotted path.
    */
    pub fn get(&self, path: &str) -> Option<Value> {
        path::reach(&self.to_value(), path)
    }

    /**
    The type name of the event, like `log`.
    */
    pub fn event_type(&self) -> Option<String> {
        match self.0.get("event")? {
            Value::String(name) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    /**
    The timestamp of the event in nanoseconds since the Unix epoch.

    Timestamps are given in milliseconds. Integers and numeric strings are accepted; fractional milliseconds are truncated.
    */
    pub fn timestamp_nanos(&self) -> Option<i128> {
        let millis = match self.0.get("timestamp")?.to_number()? {
            Number::U64(v) => v as i128,
            Number::I64(v) => v as i128,
            Number::F64(v) if v.is_finite() => v.trunc() as i128,
            Number::F64(_) => return None,
        };

        millis.checked_mul(1_000_000)
    }

    pub fn fields(&self) -> &Object {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Object> for Event {
    fn from(fields: Object) -> Self {
        Event(fields)
    }
}

impl core::fmt::Debug for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(fields) => Ok(Event(fields)),
            _ => Err(de::Error::custom("expected an event object")),
        }
    }
}
