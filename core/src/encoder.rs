/*!
Encoding events as lines.

[`format`] looks up the schemas for an event and produces one line for each measurement they describe. Each line has the form:

```text
<measurement>,<tag>=<value>[,<tag>=<value>...] <field>=<value>[,<field>=<value>...] <timestamp>
```

The comma before the tags is dropped if there are no tags, and the timestamp is dropped if the event doesn't have one. Schemas that produce no fields for an event don't produce a line.
*/

use crate::{
    config::Config,
    event::Event,
    flatten::{flatten, DEFAULT_PREFIX},
    formatters::{
        format_float, format_int, format_measurement, format_string, format_tag, format_url,
        to_text,
    },
    path,
    schema::{Descriptor, FieldType, Registry, Schema},
    serialize::{serialize, Entries},
    template::{render, Vars},
    value::{Object, Value},
};

/**
Whether descriptors are being resolved as tags or fields.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Tags,
    Fields,
}

/**
An encoder with its configuration and schemas.
*/
#[derive(Debug, Clone)]
pub struct Encoder {
    config: Config,
    schemas: Registry,
}

impl Encoder {
    /**
    Create an encoder that uses the built-in schemas.
    */
    pub fn new(config: Config) -> Self {
        Encoder::with_schemas(config, Registry::builtin())
    }

    pub fn with_schemas(config: Config, schemas: Registry) -> Self {
        Encoder { config, schemas }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schemas(&self) -> &Registry {
        &self.schemas
    }

    /**
    Encode an event into zero or more lines.
    */
    pub fn encode(&self, event: &Event) -> Vec<String> {
        format(event, &self.config, &self.schemas)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new(Config::default())
    }
}

/**
Encode an event into zero or more lines using the schemas registered for its type.

Events without a type, or with a type that has no schemas, produce no lines.
*/
pub fn format(event: &Event, config: &Config, schemas: &Registry) -> Vec<String> {
    let Some(name) = event_name(event, config) else {
        return Vec::new();
    };

    schemas
        .get(&name)
        .iter()
        .flat_map(|schema| format_schema(event, config, schema))
        .collect()
}

/**
Encode an event using a single schema.

Schemas that split lines produce one line per key of the split object.
*/
pub fn format_schema(event: &Event, config: &Config, schema: &Schema) -> Vec<String> {
    let root = event.to_value();
    let vars = Vars::empty();

    let Some(split) = schema.split_lines() else {
        return format_schema_chunk(event, &root, config, schema, &vars)
            .into_iter()
            .collect();
    };

    let Some(Value::Object(chunks)) = path::reach(&root, split.split_on()) else {
        return Vec::new();
    };

    let mut lines = Vec::new();

    for key in chunks.keys() {
        let key = Value::String(key);

        let line = match split.split_key() {
            Some(name) => format_schema_chunk(event, &root, config, schema, &vars.bind(name, &key)),
            None => format_schema_chunk(event, &root, config, schema, &vars),
        };

        lines.extend(line);
    }

    lines
}

fn format_schema_chunk(
    event: &Event,
    root: &Value,
    config: &Config,
    schema: &Schema,
    vars: &Vars,
) -> Option<String> {
    let mut fields = match custom_log_fields(event, config) {
        Some(fields) => fields,
        None => format_data(root, schema.fields(), vars, Mode::Fields),
    };

    if fields.is_empty() {
        return None;
    }

    let mut tags = Entries::new();

    let host = event
        .get("host")
        .filter(|host| !to_text(host).is_empty())
        .or_else(|| config.host().map(Value::from));

    if let Some(host) = host {
        tags.insert("host", format_tag(&host));
    }

    if let Some(pid) = event.get("pid") {
        tags.insert("pid", format_tag(&pid));
    }

    tags.extend_absent(format_data(root, schema.tags(), vars, Mode::Tags));
    tags.extend_absent(static_tags(config.metadata()));
    tags.extend_absent(static_tags(config.default_tags()));

    let default_fields = Value::Object(config.default_fields().clone());
    fields.extend_absent(flatten(&default_fields, ""));

    let mut line = format_measurement(&format!(
        "{}{}",
        config.measurement_prefix(),
        schema.metric()
    ));

    if !tags.is_empty() {
        line.push(',');
        line.push_str(&serialize(&tags));
    }

    line.push(' ');
    line.push_str(&serialize(&fields));

    if let Some(timestamp) = event.timestamp_nanos() {
        line.push(' ');
        line.push_str(&timestamp.to_string());
    }

    Some(line)
}

/**
Resolve descriptors against an event.

Values are read from the event first, then from the template variables, then from the descriptor's default. Values that can't be resolved or formatted are left out.
*/
pub fn format_data(root: &Value, descriptors: &[Descriptor], vars: &Vars, mode: Mode) -> Entries {
    let mut entries = Entries::new();

    for descriptor in descriptors {
        if let FieldType::Iterator(iteration) = descriptor.kind() {
            if mode == Mode::Tags {
                continue;
            }

            let base = render(iteration.base(), vars);

            if let Some(Value::Object(items)) = lookup(root, &base, vars) {
                for key in items.keys() {
                    let key = Value::String(key);
                    let vars = vars.bind(iteration.item_key(), &key);

                    entries.extend(format_data(root, iteration.fields(), &vars, mode));
                }
            }

            continue;
        }

        let key = descriptor.key().map(|key| render(key, vars));

        let value = descriptor
            .value()
            .and_then(|path| lookup(root, &render(path, vars), vars))
            .or_else(|| descriptor.default_value().cloned());

        let value = match (value, descriptor.transform()) {
            (Some(value), Some(transform)) => Some(transform.apply(value)).filter(|v| !v.is_null()),
            (value, _) => value,
        };

        let Some(value) = value else {
            continue;
        };

        match mode {
            Mode::Tags => {
                let Some(key) = key else {
                    continue;
                };

                let value = format_tag(&value);

                if !value.is_empty() {
                    entries.insert(format_tag(&Value::from(&*key)), value);
                }
            }
            Mode::Fields => match descriptor.kind() {
                FieldType::Object => {
                    let prefix = descriptor
                        .key_prefix()
                        .or(key.as_deref())
                        .unwrap_or(DEFAULT_PREFIX);

                    entries.extend(flatten(&value, prefix));
                }
                kind => {
                    let Some(key) = key else {
                        continue;
                    };

                    let formatted = match kind {
                        FieldType::Url => Some(format_string(&Value::String(format_url(&value)))),
                        FieldType::Int => format_int(&value)
                            .or_else(|| descriptor.default_value().and_then(format_int)),
                        FieldType::Float => format_float(&value)
                            .or_else(|| descriptor.default_value().and_then(format_float)),
                        _ => Some(format_string(&value)),
                    };

                    if let Some(formatted) = formatted {
                        entries.insert(key.into_owned(), formatted);
                    }
                }
            },
        }
    }

    entries
}

fn event_name(event: &Event, config: &Config) -> Option<String> {
    match config.event_name() {
        Some(name) => name.resolve(event),
        None => event.event_type(),
    }
}

fn lookup(root: &Value, path: &str, vars: &Vars) -> Option<Value> {
    path::reach(root, path).or_else(|| vars.get(path).filter(|v| !v.is_null()).cloned())
}

fn static_tags(tags: &Object) -> Entries {
    let mut entries = Entries::new();

    for (k, v) in tags.entries() {
        if v.is_null() || v.as_str() == Some("") {
            continue;
        }

        entries.insert(format_tag(&Value::from(k)), format_tag(&v));
    }

    entries
}

fn custom_log_fields(event: &Event, config: &Config) -> Option<Entries> {
    let custom_log = config.custom_log()?;

    if event_name(event, config).as_deref() != Some("log") {
        return None;
    }

    let data = event.get("data")?;
    let extracted = custom_log.extract(&data)?;

    let mut fields = Entries::new();

    for (k, v) in extracted.entries() {
        let formatted = match v.to_number() {
            _ if v.is_null() => continue,
            Some(number) if number.is_integral() => format_int(&v),
            Some(number) if number.is_finite() => format_float(&v),
            _ => None,
        };

        fields.insert(k, formatted.unwrap_or_else(|| format_string(&v)));
    }

    Some(fields).filter(|fields| !fields.is_empty())
}
