/*!
Formatters for individual line protocol tokens.

Each formatter converts a [`Value`] into text that's safe to drop into one position of a line:

- [`format_measurement`] for measurement names.
- [`format_tag`] for tag keys and values.
- [`format_string`], [`format_int`], [`format_float`] for field values.

None of these functions fail. Formatters that can't represent their input return `None` and the caller decides whether to omit the token or fall back to a default.
*/

use core::{cell::RefCell, fmt::Write as _};

use crate::value::{Number, Object, Value};

/**
Format a value as an integer field, like `42i`.

Numbers are truncated toward zero. Strings are parsed as numbers first. Anything that doesn't convert into an integer returns `None`.
*/
pub fn format_int(value: &Value) -> Option<String> {
    let number = value.to_number()?;

    let int = match number {
        Number::U64(v) => return Some(format!("{v}i")),
        Number::I64(v) => return Some(format!("{v}i")),
        Number::F64(v) if v.is_finite() => v.trunc(),
        Number::F64(_) => return None,
    };

    // `as` saturates outside these bounds
    if int >= 0.0 && int < u64::MAX as f64 {
        Some(format!("{}i", int as u64))
    } else if int < 0.0 && int >= i64::MIN as f64 {
        Some(format!("{}i", int as i64))
    } else {
        None
    }
}

/**
Format a value as a float field.

Finite numbers, and strings that parse as finite numbers, are written as bare decimal tokens. Anything else returns `None`.
*/
pub fn format_float(value: &Value) -> Option<String> {
    let number = value.to_number()?;

    if number.is_finite() {
        Some(number.to_string())
    } else {
        None
    }
}

/**
Format a value as a quoted string field.

Objects are written as JSON. Arrays are written as their elements joined by `,`. Embedded `"` are escaped and newlines are replaced with a literal `\n`.
*/
pub fn format_string(value: &Value) -> String {
    let text = match value {
        Value::Object(_) => to_json(value),
        value => to_text(value),
    };

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                quoted.push_str("\\n");
            }
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    quoted
}

/**
Escape a measurement name.
*/
pub fn format_measurement(name: &str) -> String {
    escape(name, &[',', ' '])
}

/**
Format a value as a tag key or value.

The value is converted to plain text first, then `,`, `=`, and spaces are escaped.
*/
pub fn format_tag(value: &Value) -> String {
    escape(&to_text(value), &[',', '=', ' '])
}

/**
Format a value as a URL.

Strings are used as-is. Objects are treated as parsed URL parts, like `protocol`, `host`, `pathname`, `search`, and assembled back together.
*/
pub fn format_url(value: &Value) -> String {
    match value {
        Value::Object(parts) => url_from_parts(parts),
        value => to_text(value),
    }
}

/**
Convert a value into plain unquoted text.

Arrays are joined by `,`. Nulls inside arrays become empty strings. Objects are written as JSON.
*/
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => to_json(value),
    }
}

/**
Write a value as JSON.

Objects that are reached again through one of their own descendants are written as `"[Circular]"`.
*/
pub fn to_json(value: &Value) -> String {
    let ancestors = RefCell::new(Vec::new());

    sval_json::stream_to_string(Json::new(value, &ancestors))
        .unwrap_or_else(|_| String::from("null"))
}

fn escape(text: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }

        escaped.push(c);
    }

    escaped
}

fn url_from_parts(parts: &Object) -> String {
    let part = |key: &str| {
        parts
            .get(key)
            .filter(|v| !v.is_null())
            .map(|v| to_text(&v))
            .filter(|v| !v.is_empty())
    };

    let mut url = String::new();

    if let Some(protocol) = part("protocol") {
        url.push_str(&protocol);

        if !protocol.ends_with(':') {
            url.push(':');
        }
    }

    let host = part("host").or_else(|| {
        let hostname = part("hostname")?;

        Some(match part("port") {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname,
        })
    });

    if let Some(host) = host {
        if !url.is_empty() {
            url.push_str("//");
        }

        if let Some(auth) = part("auth") {
            url.push_str(&auth);
            url.push('@');
        }

        url.push_str(&host);
    }

    if let Some(pathname) = part("pathname") {
        if !url.is_empty() && !pathname.starts_with('/') {
            url.push('/');
        }

        url.push_str(&pathname);
    }

    let search = part("search").or_else(|| match parts.get("query") {
        Some(Value::Object(query)) => {
            let mut search = String::new();

            for (k, v) in query.entries() {
                search.push(if search.is_empty() { '?' } else { '&' });
                let _ = write!(search, "{}={}", k, to_text(&v));
            }

            Some(search).filter(|s| !s.is_empty())
        }
        Some(Value::String(query)) if !query.is_empty() => Some(format!("?{query}")),
        _ => None,
    });

    if let Some(search) = search {
        if !search.starts_with('?') {
            url.push('?');
        }

        url.push_str(&search);
    }

    if let Some(hash) = part("hash") {
        if !hash.starts_with('#') {
            url.push('#');
        }

        url.push_str(&hash);
    }

    url
}

/**
A [`Value`] being streamed as JSON.

The wrapper tracks the objects currently being written so that cycles terminate.
*/
pub(crate) struct Json<'a> {
    value: &'a Value,
    ancestors: &'a RefCell<Vec<usize>>,
}

impl<'a> Json<'a> {
    pub(crate) fn new(value: &'a Value, ancestors: &'a RefCell<Vec<usize>>) -> Self {
        Json { value, ancestors }
    }

    fn nested<'b>(&'b self, value: &'b Value) -> Json<'b> {
        Json {
            value,
            ancestors: self.ancestors,
        }
    }
}

impl<'a> sval::Value for Json<'a> {
    fn stream<'sval, S: sval::Stream<'sval> + ?Sized>(&'sval self, stream: &mut S) -> sval::Result {
        match self.value {
            Value::Null => stream.null(),
            Value::Bool(v) => stream.bool(*v),
            Value::Number(Number::U64(v)) => stream.u64(*v),
            Value::Number(Number::I64(v)) => stream.i64(*v),
            Value::Number(Number::F64(v)) if v.is_finite() => stream.f64(*v),
            Value::Number(Number::F64(_)) => stream.null(),
            Value::String(v) => stream.value_computed(v.as_str()),
            Value::Array(items) => {
                stream.seq_begin(Some(items.len()))?;

                for item in items {
                    stream.seq_value_begin()?;
                    stream.value_computed(&self.nested(item))?;
                    stream.seq_value_end()?;
                }

                stream.seq_end()
            }
            Value::Object(object) => {
                let addr = object.addr();

                if self.ancestors.borrow().contains(&addr) {
                    return stream.value_computed("[Circular]");
                }

                self.ancestors.borrow_mut().push(addr);
                let r = self.stream_entries(object, stream);
                self.ancestors.borrow_mut().pop();

                r
            }
        }
    }
}

impl<'a> Json<'a> {
    fn stream_entries<'sval, S: sval::Stream<'sval> + ?Sized>(
        &self,
        object: &Object,
        stream: &mut S,
    ) -> sval::Result {
        let entries = object.entries();

        stream.map_begin(Some(entries.len()))?;

        for (k, v) in &entries {
            stream.map_key_begin()?;
            stream.value_computed(k.as_str())?;
            stream.map_key_end()?;

            stream.map_value_begin()?;
            stream.value_computed(&self.nested(v))?;
            stream.map_value_end()?;
        }

        stream.map_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int() {
        assert_eq!(Some("1i"), format_int(&Value::from(1)).as_deref());
        assert_eq!(Some("1i"), format_int(&Value::from(1.1)).as_deref());
        assert_eq!(Some("1i"), format_int(&Value::from("1")).as_deref());
        assert_eq!(Some("-3i"), format_int(&Value::from(-3.7)).as_deref());
        assert_eq!(None, format_int(&Value::from("a")));
        assert_eq!(None, format_int(&Value::Null));
        assert_eq!(None, format_int(&Value::from(f64::NAN)));
    }

    #[test]
    fn int_out_of_range() {
        assert_eq!(Some("1000000000000000000i"), format_int(&Value::from(1e18)).as_deref());
        assert_eq!(None, format_int(&Value::from(1e20)));
        assert_eq!(None, format_int(&Value::from("1e20")));
        assert_eq!(None, format_int(&Value::from(-1e19)));
    }

    #[test]
    fn float() {
        assert_eq!(Some("32.29"), format_float(&Value::from(32.29)).as_deref());
        assert_eq!(Some("94"), format_float(&Value::from(94)).as_deref());
        assert_eq!(Some("456"), format_float(&Value::from("456")).as_deref());
        assert_eq!(None, format_float(&Value::from("abc")));
        assert_eq!(None, format_float(&Value::from(f64::INFINITY)));
    }

    #[test]
    fn string() {
        assert_eq!("\"test\"", format_string(&Value::from("test")));
        assert_eq!(
            "\"{\\\"a\\\":\\\"test\\\"}\"",
            format_string(&Value::Object(Object::new().with("a", "test")))
        );
        assert_eq!("\"a,b\"", format_string(&Value::from(vec!["a", "b"])));
        assert_eq!("\"test\\ntest\"", format_string(&Value::from("test\r\ntest")));
        assert_eq!("\"a\\nb\"", format_string(&Value::from("a\nb")));
        assert_eq!("\"say \\\"hi\\\"\"", format_string(&Value::from("say \"hi\"")));
    }

    #[test]
    fn measurement() {
        assert_eq!("t\\,e\\ st", format_measurement("t,e st"));
    }

    #[test]
    fn tag() {
        assert_eq!("a\\=b\\,c\\ d", format_tag(&Value::from("a=b,c d")));
        assert_eq!("9876", format_tag(&Value::from(9876)));
    }

    #[test]
    fn url() {
        assert_eq!("/hello", format_url(&Value::from("/hello")));

        let parts = Object::new()
            .with("protocol", "https:")
            .with("hostname", "example.com")
            .with("port", 8443)
            .with("pathname", "/a/b")
            .with("query", Object::new().with("k1", "v1").with("k2", "v2"));

        assert_eq!(
            "https://example.com:8443/a/b?k1=v1&k2=v2",
            format_url(&Value::Object(parts))
        );
    }

    #[test]
    fn json_circular() {
        let object = Object::new().with("a", "test");
        object.insert("self", object.clone());

        assert_eq!(
            r#"{"a":"test","self":"[Circular]"}"#,
            to_json(&Value::Object(object))
        );
    }

    #[test]
    fn json_repeated_siblings_are_not_circular() {
        let shared = Object::new().with("x", 1);
        let object = Object::new().with("a", shared.clone()).with("b", shared);

        assert_eq!(
            r#"{"a":{"x":1},"b":{"x":1}}"#,
            to_json(&Value::Object(object))
        );
    }
}
