/*!
`${name}` templates for descriptor keys and value paths.

Descriptors like `requests${code}` or `load.requests.${port}.statusCodes` are rendered against a scope of [`Vars`]. Each split line or iterator item adds a binding to the scope it was created in, so inner bindings can see outer ones.
*/

use std::borrow::Cow;

use crate::{formatters::to_text, value::Value};

/**
A scope of template variables.

Scopes are linked: a scope created with [`Vars::bind`] sees its own binding and everything in its parent.
*/
#[derive(Clone, Copy)]
pub struct Vars<'a> {
    parent: Option<&'a Vars<'a>>,
    binding: Option<(&'a str, &'a Value)>,
}

impl<'a> Vars<'a> {
    /**
    An empty scope.
    */
    pub const fn empty() -> Self {
        Vars {
            parent: None,
            binding: None,
        }
    }

    /**
    Create a child scope that binds `name` to `value`.
    */
    pub fn bind<'b>(&'b self, name: &'b str, value: &'b Value) -> Vars<'b> {
        Vars {
            parent: Some(self),
            binding: Some((name, value)),
        }
    }

    /**
    Get the innermost value bound to `name`.
    */
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let mut scope = Some(self);

        while let Some(current) = scope {
            if let Some((bound, value)) = current.binding {
                if bound == name {
                    return Some(value);
                }
            }

            scope = current.parent;
        }

        None
    }
}

impl<'a> Default for Vars<'a> {
    fn default() -> Self {
        Vars::empty()
    }
}

/**
Render a template, replacing each `${name}` with the text of its bound value.

Placeholders that aren't bound are left as-is. Templates without placeholders are returned without allocating.
*/
pub fn render<'t>(template: &'t str, vars: &Vars) -> Cow<'t, str> {
    if !template.contains("${") {
        return Cow::Borrowed(template);
    }

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };

        let name = &rest[start + 2..start + 2 + len];
        let end = start + 2 + len + 1;

        rendered.push_str(&rest[..start]);

        match vars.get(name) {
            Some(value) => rendered.push_str(&to_text(value)),
            None => rendered.push_str(&rest[start..end]),
        }

        rest = &rest[end..];
    }

    rendered.push_str(rest);

    Cow::Owned(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_plain() {
        assert!(matches!(render("os.load", &Vars::empty()), Cow::Borrowed("os.load")));
    }

    #[test]
    fn render_bound() {
        let port = Value::from("8080");
        let code = Value::from("200");

        let outer = Vars::empty();
        let vars = outer.bind("port", &port);
        let vars = vars.bind("code", &code);

        assert_eq!(
            "load.requests.8080.statusCodes.200",
            render("load.requests.${port}.statusCodes.${code}", &vars)
        );
        assert_eq!("requests200", render("requests${code}", &vars));
    }

    #[test]
    fn render_unbound_verbatim() {
        assert_eq!("a.${missing}.b", render("a.${missing}.b", &Vars::empty()));
        assert_eq!("a.${open", render("a.${open", &Vars::empty()));
    }

    #[test]
    fn inner_bindings_shadow() {
        let a = Value::from("outer");
        let b = Value::from("inner");

        let root = Vars::empty();
        let outer = root.bind("x", &a);
        let inner = outer.bind("x", &b);

        assert_eq!("inner", render("${x}", &inner));
        assert_eq!("outer", render("${x}", &outer));
    }
}
