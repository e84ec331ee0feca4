/*!
Encoder configuration.

A [`Config`] can be built with its `with_*` methods or deserialized with `serde` from the camelCase options:

```json
{
    "host": "myservice.awesome.com",
    "metadata": { "region": "west" },
    "prefix": ["my", "awesome", "service"],
    "prefixDelimiter": "/",
    "defaultTags": { "env": "prod" },
    "defaultFields": { "build": 42 },
    "eventName": "log",
    "customLogField": "metrics"
}
```

Functions can't be deserialized, so a serialized `customLogFormatter` is rejected with a [`ConfigError`].
*/

use core::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::{
    error::ConfigError,
    event::Event,
    value::{Object, Value},
};

/**
Options that affect how events are encoded.
*/
#[derive(Clone, Default, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct Config {
    host: Option<String>,
    metadata: Object,
    prefix: Option<Prefix>,
    prefix_delimiter: Option<String>,
    default_tags: Object,
    default_fields: Object,
    event_name: Option<EventName>,
    custom_log: Option<CustomLog>,
}

/**
A prefix added to every measurement name.
*/
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Prefix {
    /**
    A prefix used verbatim.
    */
    Str(String),
    /**
    Parts joined by the prefix delimiter, followed by a trailing delimiter.
    */
    Parts(Vec<String>),
}

impl From<&str> for Prefix {
    fn from(prefix: &str) -> Self {
        Prefix::Str(prefix.to_owned())
    }
}

impl From<String> for Prefix {
    fn from(prefix: String) -> Self {
        Prefix::Str(prefix)
    }
}

impl<S: Into<String>> From<Vec<S>> for Prefix {
    fn from(parts: Vec<S>) -> Self {
        Prefix::Parts(parts.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Prefix {
    fn from(parts: [S; N]) -> Self {
        Prefix::Parts(parts.into_iter().map(Into::into).collect())
    }
}

/**
The event type name used to look up schemas.
*/
#[derive(Clone)]
pub enum EventName {
    /**
    Use the same name for every event.
    */
    Fixed(String),
    /**
    Compute the name from the event.

    If the function returns `None` then the event's own type is used.
    */
    Resolve(Arc<dyn Fn(&Event) -> Option<String> + Send + Sync>),
}

impl EventName {
    /**
    Get the effective type name of an event.
    */
    pub fn resolve(&self, event: &Event) -> Option<String> {
        match self {
            EventName::Fixed(name) => Some(name.clone()),
            EventName::Resolve(f) => f(event).or_else(|| event.event_type()),
        }
    }
}

impl fmt::Debug for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventName::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            EventName::Resolve(_) => f.debug_tuple("Resolve").finish(),
        }
    }
}

/**
A replacement for the default fields of log events.
*/
#[derive(Clone)]
pub enum CustomLog {
    /**
    Use the object at this key of the event's `data`.
    */
    Field(String),
    /**
    Compute an object from the event's `data`.
    */
    Formatter(Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>),
}

impl CustomLog {
    /**
    Extract the custom log fields from the `data` of a log event.

    Returns `None` if the log should use its default fields.
    */
    pub fn extract(&self, data: &Value) -> Option<Object> {
        let extracted = match self {
            CustomLog::Field(field) => data.as_object()?.get(field)?,
            CustomLog::Formatter(f) => f(data)?,
        };

        match extracted {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }
}

impl fmt::Debug for CustomLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomLog::Field(field) => f.debug_tuple("Field").field(field).finish(),
            CustomLog::Formatter(_) => f.debug_tuple("Formatter").finish(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /**
    The host tag used for events that don't carry their own `host`.
    */
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /**
    Extra tags added to every line.

    Entries that are null or empty strings are ignored.
    */
    pub fn with_metadata(mut self, metadata: Object) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<Prefix>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /**
    The delimiter used to join prefix parts. The default is `/`.
    */
    pub fn with_prefix_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.prefix_delimiter = Some(delimiter.into());
        self
    }

    /**
    Tags added to every line that don't override any already there.
    */
    pub fn with_default_tags(mut self, tags: Object) -> Self {
        self.default_tags = tags;
        self
    }

    /**
    Fields added to every line that don't override any already there.
    */
    pub fn with_default_fields(mut self, fields: Object) -> Self {
        self.default_fields = fields;
        self
    }

    /**
    Use the schemas for `name` for every event.
    */
    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(EventName::Fixed(name.into()));
        self
    }

    /**
    Compute the name of the schemas to use for an event.
    */
    pub fn with_event_name_fn(
        mut self,
        f: impl Fn(&Event) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.event_name = Some(EventName::Resolve(Arc::new(f)));
        self
    }

    /**
    Write the object at `field` inside log data as the fields of log lines.
    */
    pub fn with_custom_log_field(mut self, field: impl Into<String>) -> Self {
        self.custom_log = Some(CustomLog::Field(field.into()));
        self
    }

    /**
    Compute the fields of log lines from their data.
    */
    pub fn with_custom_log_formatter(
        mut self,
        f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.custom_log = Some(CustomLog::Formatter(Arc::new(f)));
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn metadata(&self) -> &Object {
        &self.metadata
    }

    pub fn prefix(&self) -> Option<&Prefix> {
        self.prefix.as_ref()
    }

    pub fn prefix_delimiter(&self) -> &str {
        self.prefix_delimiter.as_deref().unwrap_or("/")
    }

    pub fn default_tags(&self) -> &Object {
        &self.default_tags
    }

    pub fn default_fields(&self) -> &Object {
        &self.default_fields
    }

    pub fn event_name(&self) -> Option<&EventName> {
        self.event_name.as_ref()
    }

    pub fn custom_log(&self) -> Option<&CustomLog> {
        self.custom_log.as_ref()
    }

    /**
    The text prepended to every measurement name.
    */
    pub fn measurement_prefix(&self) -> String {
        match &self.prefix {
            Some(Prefix::Str(prefix)) => prefix.clone(),
            Some(Prefix::Parts(parts)) => {
                let delimiter = self.prefix_delimiter();

                format!("{}{}", parts.join(delimiter), delimiter)
            }
            None => String::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("metadata", &self.metadata)
            .field("prefix", &self.prefix)
            .field("prefix_delimiter", &self.prefix_delimiter)
            .field("default_tags", &self.default_tags)
            .field("default_fields", &self.default_fields)
            .field("event_name", &self.event_name)
            .field("custom_log", &self.custom_log)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    host: Option<String>,
    #[serde(default)]
    metadata: Object,
    prefix: Option<Prefix>,
    prefix_delimiter: Option<String>,
    #[serde(default)]
    default_tags: Object,
    default_fields: Option<Object>,
    event_name: Option<String>,
    custom_log_field: Option<String>,
    custom_log_formatter: Option<Value>,
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        if raw.custom_log_formatter.is_some() {
            return Err(ConfigError::msg(
                "`customLogFormatter` must be a function; use `Config::with_custom_log_formatter`",
            ));
        }

        Ok(Config {
            host: raw.host,
            metadata: raw.metadata,
            prefix: raw.prefix,
            prefix_delimiter: raw.prefix_delimiter,
            default_tags: raw.default_tags,
            default_fields: raw.default_fields.unwrap_or_default(),
            event_name: raw.event_name.map(EventName::Fixed),
            custom_log: raw.custom_log_field.map(CustomLog::Field),
        })
    }
}
