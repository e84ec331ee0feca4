/*!
The [`Value`] type.

A value is the dynamic, JSON-compatible data carried by events. It can be a null, a bool, a [`Number`], a string, an array, or an [`Object`].

Objects are shared nodes with stable identity. Cloning an [`Object`] gives another handle to the same entries, so graphs that refer back to themselves can be built with [`Object::insert`]. Anything that walks a value tree needs to account for that; see [`crate::flatten`].

Values can be deserialized from any `serde` format, keeping object entries in document order, and streamed through `sval`.
*/

use core::{fmt, str::FromStr};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

/**
A dynamic value.
*/
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

/**
A numeric value.

Numbers keep the representation they were created with, so integers that don't fit in an `f64` aren't rounded.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    U64(u64),
    I64(i64),
    F64(f64),
}

impl Number {
    /**
    Get the number as an `f64`, potentially losing precision.
    */
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::U64(v) => v as f64,
            Number::I64(v) => v as f64,
            Number::F64(v) => v,
        }
    }

    /**
    Whether the number is a whole number.

    Floats with no fractional part, like `5.0`, are considered integral.
    */
    pub fn is_integral(&self) -> bool {
        match *self {
            Number::U64(_) | Number::I64(_) => true,
            Number::F64(v) => v.is_finite() && v.fract() == 0.0,
        }
    }

    /**
    Whether the number is finite.
    */
    pub fn is_finite(&self) -> bool {
        match *self {
            Number::U64(_) | Number::I64(_) => true,
            Number::F64(v) => v.is_finite(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::U64(v) => fmt::Display::fmt(v, f),
            Number::I64(v) => fmt::Display::fmt(v, f),
            Number::F64(v) => fmt::Display::fmt(v, f),
        }
    }
}

impl FromStr for Number {
    type Err = core::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(v) = s.parse::<u64>() {
            return Ok(Number::U64(v));
        }

        if let Ok(v) = s.parse::<i64>() {
            return Ok(Number::I64(v));
        }

        s.parse::<f64>().map(Number::F64)
    }
}

/**
A shared, ordered set of key-value entries.

Entries keep the order they were first inserted in. Inserting an existing key replaces its value in place.
*/
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<Vec<(String, Value)>>>);

impl Object {
    /**
    Create a new empty object.
    */
    pub fn new() -> Self {
        Object::default()
    }

    /**
    Insert an entry into the object.

    This method takes `&self` because objects are shared. Any other handle to the same object will see the new entry.
    */
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let mut entries = self.0.write().unwrap_or_else(PoisonError::into_inner);

        if let Some((_, existing)) = entries.iter_mut().find(|(k, _)| *k == key) {
            *existing = value;
        } else {
            entries.push((key, value));
        }
    }

    /**
    Insert an entry, returning the object.
    */
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /**
    Get the value for a key.
    */
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /**
    Take a snapshot of the entries in the object.

    The snapshot doesn't hold any lock on the object, so it's safe to walk into nested values while holding it.
    */
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /**
    Take a snapshot of the keys in the object.
    */
    pub fn keys(&self) -> Vec<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /**
    Whether two handles refer to the same object.
    */
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();

        for (k, v) in iter {
            object.insert(k, v);
        }

        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::formatters::to_json(&Value::Object(self.clone())))
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /**
    Get a number from the value.

    Numbers are returned as-is. Strings are parsed after trimming surrounding whitespace.
    */
    pub fn to_number(&self) -> Option<Number> {
        match self {
            Value::Number(v) => Some(*v),
            Value::String(v) => v.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::formatters::to_json(self))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Value::Number(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

macro_rules! impl_from_int {
    ($($unsigned:ty),* ; $($signed:ty),*) => {
        $(
            impl From<$unsigned> for Value {
                fn from(value: $unsigned) -> Self {
                    Value::Number(Number::U64(value as u64))
                }
            }
        )*
        $(
            impl From<$signed> for Value {
                fn from(value: $signed) -> Self {
                    if value >= 0 {
                        Value::Number(Number::U64(value as u64))
                    } else {
                        Value::Number(Number::I64(value as i64))
                    }
                }
            }
        )*
    };
}

impl_from_int!(u8, u16, u32, u64, usize ; i8, i16, i32, i64, isize);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(Number::F64(value as f64))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(Number::F64(value))
    }
}

impl sval::Value for Value {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        let ancestors = core::cell::RefCell::new(Vec::new());

        stream.value_computed(&crate::formatters::Json::new(self, &ancestors))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("any JSON-compatible value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::from(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Number(Number::U64(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Number(Number::F64(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                Ok(Value::String(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
                Ok(Value::String(v))
            }

            fn visit_none<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
                Deserialize::deserialize(deserializer)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));

                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }

                Ok(Value::Array(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
                let object = Object::new();

                while let Some((k, v)) = map.next_entry::<String, Value>()? {
                    object.insert(k, v);
                }

                Ok(Value::Object(object))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Object {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(object) => Ok(object),
            Value::Null => Ok(Object::new()),
            _ => Err(de::Error::custom("expected a map")),
        }
    }
}
