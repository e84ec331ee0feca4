/*!
Encode telemetry events as InfluxDB line protocol.

Events are dynamic objects, like a log record or a periodic snapshot of process load. Each event type maps to one or more [`schema::Schema`]s describing the measurements to derive from it. The [`encoder::format`] function looks up those schemas and produces one line per measurement:

```text
log,host=mytesthost,pid=1234 data="Things are good",tags="info,request" 1485996802647000000
```

Encoding is pure. It never fails: data that's missing or malformed is left out, or replaced with defaults given by the schema.
*/

pub mod config;
pub mod encoder;
pub mod error;
pub mod event;
pub mod flatten;
pub mod formatters;
pub mod path;
pub mod schema;
pub mod schemas;
pub mod serialize;
pub mod template;
pub mod value;

#[doc(inline)]
pub use self::{
    config::Config,
    encoder::{format, Encoder},
    error::ConfigError,
    event::Event,
    schema::{Descriptor, Registry, Schema, Transform},
    value::{Number, Object, Value},
};
