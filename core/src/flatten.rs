/*!
Flattening nested values into dotted field keys.

Objects are walked depth-first, joining keys with `.`. Objects can refer back to themselves, so the walk keeps the chain of objects it's currently inside. An object that's already on that chain is written as a marker instead of being walked again.
*/

use crate::{
    formatters::format_string,
    serialize::Entries,
    value::{Object, Value},
};

/**
The prefix used for flattened data when nothing else is given.
*/
pub const DEFAULT_PREFIX: &str = "data";

const CIRCULAR: &str = "\"...omitted (circular reference detected)...\"";

/**
Flatten a value into field entries.

Nulls produce no entries. Non-object values produce a single entry keyed by `prefix`.
*/
pub fn flatten(value: &Value, prefix: &str) -> Entries {
    let mut entries = Entries::new();
    let mut ancestors = Vec::new();

    flatten_into(value, prefix, &mut ancestors, &mut entries);

    entries
}

fn flatten_into(value: &Value, prefix: &str, ancestors: &mut Vec<Object>, entries: &mut Entries) {
    match value {
        Value::Null => (),
        Value::Object(object) => {
            if ancestors.iter().any(|ancestor| ancestor.ptr_eq(object)) {
                entries.insert(prefix, CIRCULAR);
                return;
            }

            ancestors.push(object.clone());

            for (k, v) in object.entries() {
                let key = if prefix.is_empty() {
                    k
                } else {
                    format!("{prefix}.{k}")
                };

                flatten_into(&v, &key, ancestors, entries);
            }

            ancestors.pop();
        }
        Value::Number(number) if number.is_integral() && number.is_finite() => {
            entries.insert(prefix, format!("{}i", number));
        }
        Value::Number(number) if number.is_finite() => {
            entries.insert(prefix, number.to_string());
        }
        value => {
            entries.insert(prefix, format_string(value));
        }
    }
}
