/*!
The schema model.

A [`Schema`] describes one measurement that can be derived from an event: its metric name, the tags and fields to pull from the event, and optionally a sub-object to split into one line per key. Fields and tags are described by [`Descriptor`]s.

A [`Registry`] maps event type names to the schemas that apply to them. Schemas, descriptors, and registries can be deserialized with `serde`:

```json
{
    "ops_concurrents": {
        "metric": "ops_concurrents",
        "splitLines": { "splitOn": "load.concurrents", "splitKey": "port" },
        "tags": [{ "key": "port", "value": "port" }],
        "fields": [{ "key": "concurrents", "type": "float", "value": "load.concurrents.${port}" }]
    }
}
```
*/

use core::fmt;
use std::{collections::HashMap, sync::Arc};

use serde::{de, Deserialize, Deserializer};

use crate::{formatters::to_text, value::Value};

/**
A description of one measurement derived from an event.
*/
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    metric: String,
    #[serde(default)]
    tags: Vec<Descriptor>,
    #[serde(default)]
    fields: Vec<Descriptor>,
    #[serde(default)]
    split_lines: Option<SplitLines>,
}

/**
Split a schema into one line per key of a sub-object.
*/
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitLines {
    split_on: String,
    #[serde(default)]
    split_key: Option<String>,
}

impl Schema {
    pub fn new(metric: impl Into<String>) -> Self {
        Schema {
            metric: metric.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            split_lines: None,
        }
    }

    pub fn with_field(mut self, field: Descriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_tag(mut self, tag: Descriptor) -> Self {
        self.tags.push(tag);
        self
    }

    /**
    Emit one line per key of the object at `split_on`.

    If `split_key` is given, each key is bound to it as a template variable while the line is built.
    */
    pub fn with_split_lines(
        mut self,
        split_on: impl Into<String>,
        split_key: Option<&str>,
    ) -> Self {
        self.split_lines = Some(SplitLines {
            split_on: split_on.into(),
            split_key: split_key.map(Into::into),
        });
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn tags(&self) -> &[Descriptor] {
        &self.tags
    }

    pub fn fields(&self) -> &[Descriptor] {
        &self.fields
    }

    pub fn split_lines(&self) -> Option<&SplitLines> {
        self.split_lines.as_ref()
    }
}

impl SplitLines {
    pub fn split_on(&self) -> &str {
        &self.split_on
    }

    pub fn split_key(&self) -> Option<&str> {
        self.split_key.as_deref()
    }
}

/**
A description of a single field or tag.

The key and value are `${name}` templates. The rendered value is a path into the event, or the name of a template variable.
*/
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawDescriptor")]
pub struct Descriptor {
    key: Option<String>,
    value: Option<String>,
    kind: FieldType,
    default: Option<Value>,
    transform: Option<Transform>,
    key_prefix: Option<String>,
}

/**
The way a field value is written.

Tags ignore their type and are always written as escaped text.
*/
#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Int,
    Float,
    Url,
    /**
    Flatten an object into one field per leaf.
    */
    Object,
    /**
    Evaluate nested fields once per key of an object.
    */
    Iterator(Iteration),
}

/**
The parameters of an [`FieldType::Iterator`] descriptor.
*/
#[derive(Debug, Clone)]
pub struct Iteration {
    base: String,
    item_key: String,
    fields: Vec<Descriptor>,
}

impl Iteration {
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn item_key(&self) -> &str {
        &self.item_key
    }

    pub fn fields(&self) -> &[Descriptor] {
        &self.fields
    }
}

impl Descriptor {
    fn new(key: Option<String>, kind: FieldType) -> Self {
        Descriptor {
            key,
            value: None,
            kind,
            default: None,
            transform: None,
            key_prefix: None,
        }
    }

    /**
    A quoted string field.
    */
    pub fn string(key: impl Into<String>) -> Self {
        Descriptor::new(Some(key.into()), FieldType::String)
    }

    /**
    An integer field.
    */
    pub fn int(key: impl Into<String>) -> Self {
        Descriptor::new(Some(key.into()), FieldType::Int)
    }

    /**
    A float field.
    */
    pub fn float(key: impl Into<String>) -> Self {
        Descriptor::new(Some(key.into()), FieldType::Float)
    }

    /**
    A quoted URL field.
    */
    pub fn url(key: impl Into<String>) -> Self {
        Descriptor::new(Some(key.into()), FieldType::Url)
    }

    /**
    An object flattened from the value at `path`.
    */
    pub fn object(path: impl Into<String>) -> Self {
        Descriptor::new(None, FieldType::Object).with_value(path)
    }

    /**
    A set of fields evaluated for each key of the object at `base`.
    */
    pub fn iterator(
        base: impl Into<String>,
        item_key: impl Into<String>,
        fields: impl IntoIterator<Item = Descriptor>,
    ) -> Self {
        Descriptor::new(
            None,
            FieldType::Iterator(Iteration {
                base: base.into(),
                item_key: item_key.into(),
                fields: fields.into_iter().collect(),
            }),
        )
    }

    /**
    Read the value from `path` instead of the key.
    */
    pub fn with_value(mut self, path: impl Into<String>) -> Self {
        self.value = Some(path.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /**
    The prefix to use for flattened object keys.
    */
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(key_prefix.into());
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /**
    The path template the value is read from.

    If no value path was given, the key is used.
    */
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref().or(self.key.as_deref())
    }

    pub fn kind(&self) -> &FieldType {
        &self.kind
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    pub fn key_prefix(&self) -> Option<&str> {
        self.key_prefix.as_deref()
    }
}

/**
A function applied to a resolved value before it's formatted.
*/
#[derive(Clone)]
pub struct Transform {
    name: &'static str,
    f: Arc<dyn Fn(Value) -> Value + Send + Sync>,
}

impl Transform {
    pub fn new(f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        Transform {
            name: "custom",
            f: Arc::new(f),
        }
    }

    /**
    Convert the value to upper-case text.
    */
    pub fn upper_case() -> Self {
        Transform {
            name: "toUpper",
            f: Arc::new(|value| match value {
                Value::Null => Value::Null,
                Value::String(text) => Value::String(text.to_uppercase()),
                value => Value::String(to_text(&value).to_uppercase()),
            }),
        }
    }

    /**
    Convert an object into a `key=value&key=value` query string.
    */
    pub fn query_string() -> Self {
        Transform {
            name: "queryString",
            f: Arc::new(|value| match value {
                Value::Object(query) => Value::String(
                    query
                        .entries()
                        .into_iter()
                        .map(|(k, v)| format!("{}={}", k, to_text(&v)))
                        .collect::<Vec<_>>()
                        .join("&"),
                ),
                value => value,
            }),
        }
    }

    /**
    Get a built-in transform by its serialized name.
    */
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "toUpper" => Some(Transform::upper_case()),
            "queryString" => Some(Transform::query_string()),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn apply(&self, value: Value) -> Value {
        (self.f)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transform").field(&self.name).finish()
    }
}

impl<'de> Deserialize<'de> for Transform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;

        Transform::from_name(&name)
            .ok_or_else(|| de::Error::custom(format_args!("unknown transform `{name}`")))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    key: Option<String>,
    value: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    default: Option<Value>,
    transform: Option<Transform>,
    key_prefix: Option<String>,
    iterator_base: Option<String>,
    item_key: Option<String>,
    fields: Option<Vec<Descriptor>>,
}

impl TryFrom<RawDescriptor> for Descriptor {
    type Error = String;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        let kind = match raw.kind.as_deref().unwrap_or("string") {
            "string" => FieldType::String,
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "url" => FieldType::Url,
            "object" => FieldType::Object,
            "iterator" => FieldType::Iterator(Iteration {
                base: raw
                    .iterator_base
                    .ok_or("an iterator field needs an `iteratorBase`")?,
                item_key: raw.item_key.ok_or("an iterator field needs an `itemKey`")?,
                fields: raw.fields.unwrap_or_default(),
            }),
            kind => return Err(format!("unknown field type `{kind}`")),
        };

        Ok(Descriptor {
            key: raw.key,
            value: raw.value,
            kind,
            default: raw.default.filter(|v| !v.is_null()),
            transform: raw.transform,
            key_prefix: raw.key_prefix,
        })
    }
}

/**
A set of schemas, keyed by event type name.

Each event type maps to an ordered sequence of schemas. Events with no entry in the registry don't produce any lines.
*/
#[derive(Debug, Clone, Default)]
pub struct Registry(HashMap<String, Vec<Schema>>);

impl Registry {
    /**
    An empty registry.
    */
    pub fn new() -> Self {
        Registry::default()
    }

    /**
    A registry with the built-in schemas for `log`, `error`, `request`, `response`, and `ops` events.
    */
    pub fn builtin() -> Self {
        crate::schemas::builtin()
    }

    /**
    Set the schemas for an event type, replacing any that were there.
    */
    pub fn insert(&mut self, event: impl Into<String>, schemas: impl IntoIterator<Item = Schema>) {
        self.0.insert(event.into(), schemas.into_iter().collect());
    }

    pub fn with(
        mut self,
        event: impl Into<String>,
        schemas: impl IntoIterator<Item = Schema>,
    ) -> Self {
        self.insert(event, schemas);
        self
    }

    /**
    Set the schemas for each event type in `other`, replacing any that were there.
    */
    pub fn extend(&mut self, other: Registry) {
        self.0.extend(other.0);
    }

    /**
    Get the schemas for an event type.

    Unknown event types get an empty slice.
    */
    pub fn get(&self, event: &str) -> &[Schema] {
        self.0.get(event).map(|schemas| &**schemas).unwrap_or(&[])
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.contains_key(event)
    }
}

impl<'de> Deserialize<'de> for Registry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(Schema),
            Many(Vec<Schema>),
        }

        let entries = HashMap::<String, OneOrMany>::deserialize(deserializer)?;

        Ok(Registry(
            entries
                .into_iter()
                .map(|(event, schemas)| {
                    let schemas = match schemas {
                        OneOrMany::One(schema) => vec![schema],
                        OneOrMany::Many(schemas) => schemas,
                    };

                    (event, schemas)
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::value::Object;

    #[test]
    fn deserialize_registry_normalizes_single_schemas() {
        let registry: Registry = serde_json::from_str(
            r#"{
                "single": { "metric": "single", "fields": [{ "key": "a" }] },
                "many": [
                    { "metric": "first", "fields": [{ "key": "a", "type": "int" }] },
                    { "metric": "second", "fields": [{ "key": "b", "type": "float", "default": 0 }] }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(1, registry.get("single").len());
        assert_eq!(
            vec!["first", "second"],
            registry.get("many").iter().map(|s| s.metric()).collect::<Vec<_>>()
        );
        assert!(registry.get("missing").is_empty());
    }

    #[test]
    fn deserialize_descriptor_types() {
        let schema: Schema = serde_json::from_str(
            r#"{
                "metric": "ops_requests",
                "splitLines": { "splitOn": "load.requests", "splitKey": "port" },
                "tags": [{ "key": "port", "value": "port" }],
                "fields": [
                    { "type": "object", "value": "error.data", "keyPrefix": "error" },
                    { "key": "method", "value": "method", "transform": "toUpper" },
                    {
                        "type": "iterator",
                        "iteratorBase": "load.requests.${port}.statusCodes",
                        "itemKey": "code",
                        "fields": [{ "key": "requests${code}", "type": "float" }]
                    }
                ]
            }"#,
        )
        .unwrap();

        let split = schema.split_lines().unwrap();
        assert_eq!("load.requests", split.split_on());
        assert_eq!(Some("port"), split.split_key());

        assert!(matches!(schema.fields()[0].kind(), FieldType::Object));
        assert_eq!(Some("error"), schema.fields()[0].key_prefix());
        assert!(matches!(schema.fields()[1].kind(), FieldType::String));
        assert_eq!("toUpper", schema.fields()[1].transform().unwrap().name());

        let FieldType::Iterator(iteration) = schema.fields()[2].kind() else {
            panic!("expected an iterator");
        };
        assert_eq!("code", iteration.item_key());
        assert_eq!(1, iteration.fields().len());
    }

    #[test]
    fn deserialize_rejects_unknown_names() {
        assert!(serde_json::from_str::<Descriptor>(r#"{ "key": "a", "type": "bool" }"#).is_err());
        assert!(
            serde_json::from_str::<Descriptor>(r#"{ "key": "a", "transform": "reverse" }"#).is_err()
        );
        assert!(
            serde_json::from_str::<Descriptor>(r#"{ "type": "iterator", "itemKey": "x" }"#).is_err()
        );
    }

    #[test]
    fn value_path_defaults_to_key() {
        assert_eq!(Some("a.b"), Descriptor::string("a.b").value());
        assert_eq!(Some("c"), Descriptor::string("a.b").with_value("c").value());
    }

    #[test]
    fn transforms() {
        assert_eq!(Some("GET"), Transform::upper_case().apply(Value::from("get")).as_str());
        assert!(Transform::upper_case().apply(Value::Null).is_null());

        let query = Value::Object(Object::new().with("k1", "v1").with("k2", "v2"));
        assert_eq!(
            Some("k1=v1&k2=v2"),
            Transform::query_string().apply(query).as_str()
        );
    }
}
