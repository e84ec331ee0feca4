/*!
Reaching into values with dotted paths.

A path like `os.load[0]` or `load.requests.8080.statusCodes` walks through nested objects by key. Segments that are numbers, and `[n]` suffixes, index into arrays.
*/

use crate::value::Value;

/**
Get the value at `path` inside `root`.

Returns `None` if any segment is missing or the value found is null.
*/
pub fn reach(root: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(root.clone()).filter(|v| !v.is_null());
    }

    let mut current = root.clone();

    for segment in path.split('.') {
        let (key, indexes) = split_indexes(segment)?;

        if !key.is_empty() {
            current = step(&current, key)?;
        }

        for index in indexes {
            current = current.as_array()?.get(index)?.clone();
        }
    }

    Some(current).filter(|v| !v.is_null())
}

fn step(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(object) => object.get(key),
        Value::Array(items) => items.get(key.parse::<usize>().ok()?).cloned(),
        _ => None,
    }
}

fn split_indexes(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };

    let key = &segment[..open];
    let mut rest = &segment[open..];
    let mut indexes = Vec::new();

    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;

        indexes.push(inner[..close].trim().parse().ok()?);
        rest = &inner[close + 1..];
    }

    Some((key, indexes))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::value::Object;

    fn event() -> Value {
        Value::Object(
            Object::new()
                .with(
                    "os",
                    Object::new().with("load", vec![1.5, 2.5, 3.5]).with(
                        "mem",
                        Object::new().with("free", 100).with("total", Value::Null),
                    ),
                )
                .with(
                    "load",
                    Object::new().with(
                        "requests",
                        Object::new().with("8080", Object::new().with("total", 94)),
                    ),
                ),
        )
    }

    #[test]
    fn reach_nested_keys() {
        assert_eq!(
            Some("100"),
            reach(&event(), "os.mem.free").map(|v| v.to_number().unwrap().to_string()).as_deref()
        );
        assert_eq!(
            Some("94"),
            reach(&event(), "load.requests.8080.total")
                .map(|v| v.to_number().unwrap().to_string())
                .as_deref()
        );
    }

    #[test]
    fn reach_array_indexes() {
        let as_f64 = |path| reach(&event(), path).and_then(|v| v.as_number()).map(|n| n.as_f64());

        assert_eq!(Some(1.5), as_f64("os.load[0]"));
        assert_eq!(Some(3.5), as_f64("os.load.2"));
        assert_eq!(None, as_f64("os.load[3]"));
    }

    #[test]
    fn reach_missing() {
        assert!(reach(&event(), "os.mem.total").is_none());
        assert!(reach(&event(), "os.cpu").is_none());
        assert!(reach(&event(), "os.mem.free.deeper").is_none());
        assert!(reach(&event(), "os.load[x]").is_none());
    }
}
