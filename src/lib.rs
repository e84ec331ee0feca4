/*!
Report structured application events to InfluxDB.

Events are encoded into [line protocol](https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/) by schemas registered per event type, buffered, and sent in batches over HTTP or UDP.

```no_run
# async fn run() -> Result<(), good_influx::Error> {
use std::time::Duration;

use good_influx::{Config, Event, Object};

let reporter = good_influx::reporter("http://localhost:8086/write?db=mydb")
    .threshold(20)
    .config(Config::new().with_prefix(["my", "service"]))
    .spawn()?;

reporter.send(Event::new(
    Object::new()
        .with("event", "log")
        .with("timestamp", 1485996802647u64)
        .with("tags", "info")
        .with("data", "Things are good"),
));

reporter.flush(Duration::from_secs(5)).await;
# Ok(())
# }
```

The encoder itself is synchronous and can be used directly through [`format`] or [`Encoder`].

Diagnostics about the reporter itself are emitted through `emit`'s internal runtime.
*/

mod error;
mod internal_metrics;
mod reporter;
mod transport;

#[doc(inline)]
pub use good_influx_core::{
    config, encoder, event, flatten, formatters, path, schema, schemas, serialize, template, value,
    format, Config, ConfigError, Descriptor, Encoder, Event, Number, Object, Registry, Schema,
    Transform, Value,
};

pub use good_influx_batcher::Metric;

pub use self::{
    error::Error,
    reporter::{reporter, Reporter, ReporterBuilder},
    transport::UdpType,
};
