/*!
Built-in schemas for standard event types.
*/

use crate::schema::{Descriptor, Registry, Schema, Transform};

pub(crate) fn builtin() -> Registry {
    Registry::new()
        .with("log", [log()])
        .with("error", [error()])
        .with("request", [request()])
        .with("response", [response()])
        .with(
            "ops",
            [
                ops(),
                ops_requests(),
                ops_concurrents(),
                ops_response_times(),
                ops_sockets(),
            ],
        )
}

/**
Log events: flattened `data` and their tags.
*/
pub fn log() -> Schema {
    Schema::new("log")
        .with_field(Descriptor::object("data"))
        .with_field(Descriptor::string("tags"))
}

/**
Error events.
*/
pub fn error() -> Schema {
    Schema::new("error")
        .with_field(Descriptor::string("error.name"))
        .with_field(Descriptor::string("error.message"))
        .with_field(Descriptor::string("error.stack"))
        .with_field(Descriptor::string("error.statusCode").with_value("error.output.statusCode"))
        .with_field(Descriptor::object("error.data").with_key_prefix("error"))
        .with_field(Descriptor::string("id"))
        .with_field(Descriptor::url("url"))
        .with_field(Descriptor::string("method").with_transform(Transform::upper_case()))
        .with_field(Descriptor::string("tags"))
}

/**
Request events, like those logged while a request is being handled.
*/
pub fn request() -> Schema {
    Schema::new("request")
        .with_field(Descriptor::object("data"))
        .with_field(Descriptor::string("id"))
        .with_field(Descriptor::string("method").with_transform(Transform::upper_case()))
        .with_field(Descriptor::string("path"))
        .with_field(Descriptor::string("tags"))
}

/**
Response events.
*/
pub fn response() -> Schema {
    Schema::new("response")
        .with_field(Descriptor::string("httpVersion"))
        .with_field(Descriptor::string("id"))
        .with_field(Descriptor::string("instance"))
        .with_field(Descriptor::string("labels"))
        .with_field(Descriptor::string("method").with_transform(Transform::upper_case()))
        .with_field(Descriptor::string("path"))
        .with_field(Descriptor::string("query").with_transform(Transform::query_string()))
        .with_field(Descriptor::string("referer").with_value("source.referer"))
        .with_field(Descriptor::string("remoteAddress").with_value("source.remoteAddress"))
        .with_field(Descriptor::int("responseTime"))
        .with_field(Descriptor::int("statusCode"))
        .with_field(Descriptor::string("userAgent").with_value("source.userAgent"))
}

/**
The process and OS snapshot of an ops event.
*/
pub fn ops() -> Schema {
    Schema::new("ops")
        .with_field(Descriptor::float("os.cpu1m").with_value("os.load[0]"))
        .with_field(Descriptor::float("os.cpu5m").with_value("os.load[1]"))
        .with_field(Descriptor::float("os.cpu15m").with_value("os.load[2]"))
        .with_field(Descriptor::int("os.freemem").with_value("os.mem.free"))
        .with_field(Descriptor::int("os.totalmem").with_value("os.mem.total"))
        .with_field(Descriptor::int("os.uptime"))
        .with_field(Descriptor::float("proc.delay"))
        .with_field(Descriptor::int("proc.heapTotal").with_value("proc.mem.heapTotal"))
        .with_field(Descriptor::int("proc.heapUsed").with_value("proc.mem.heapUsed"))
        .with_field(Descriptor::int("proc.rss").with_value("proc.mem.rss"))
        .with_field(Descriptor::float("proc.uptime"))
}

/**
Request counts of an ops event, one line per port.
*/
pub fn ops_requests() -> Schema {
    Schema::new("ops_requests")
        .with_split_lines("load.requests", Some("port"))
        .with_tag(Descriptor::string("port"))
        .with_field(Descriptor::float("requestsTotal").with_value("load.requests.${port}.total"))
        .with_field(
            Descriptor::float("requestsDisconnects")
                .with_value("load.requests.${port}.disconnects"),
        )
        .with_field(Descriptor::iterator(
            "load.requests.${port}.statusCodes",
            "code",
            [Descriptor::float("requests${code}")
                .with_value("load.requests.${port}.statusCodes.${code}")],
        ))
}

/**
Concurrent connections of an ops event, one line per port.
*/
pub fn ops_concurrents() -> Schema {
    Schema::new("ops_concurrents")
        .with_split_lines("load.concurrents", Some("port"))
        .with_tag(Descriptor::string("port"))
        .with_field(Descriptor::float("concurrents").with_value("load.concurrents.${port}"))
}

/**
Response times of an ops event, one line per port.

Missing or non-numeric times are written as `0`.
*/
pub fn ops_response_times() -> Schema {
    Schema::new("ops_responseTimes")
        .with_split_lines("load.responseTimes", Some("port"))
        .with_tag(Descriptor::string("port"))
        .with_field(
            Descriptor::float("avg")
                .with_value("load.responseTimes.${port}.avg")
                .with_default(0),
        )
        .with_field(
            Descriptor::float("max")
                .with_value("load.responseTimes.${port}.max")
                .with_default(0),
        )
}

/**
Open sockets of an ops event, one field per protocol.
*/
pub fn ops_sockets() -> Schema {
    Schema::new("ops_sockets").with_field(Descriptor::iterator(
        "load.sockets",
        "protocol",
        [Descriptor::float("${protocol}Total").with_value("load.sockets.${protocol}.total")],
    ))
}
