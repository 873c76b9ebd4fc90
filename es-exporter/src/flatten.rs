//! Flattening of schema-free stats documents into `(name, doc, value)` triples.
//!
//! The walk is depth-first and lazy. Only numeric leaves are emitted; the
//! reserved `timestamp` key is skipped together with everything below it.
//!
//! With the default [`NameStyle::Leaf`] a metric name is the prefix followed by
//! the leaf key alone: intermediate object keys never become part of the name,
//! so `{"b": {"c": 2.5}}` under prefix `x_` yields `x_c`. Array elements are
//! walked with the same prefix as the array itself. [`NameStyle::Path`] joins
//! every object key on the way down instead.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const TIMESTAMP_KEY: &str = "timestamp";

/// How names are built while descending into nested objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameStyle {
    /// Prefix plus leaf key. Leaves with equal keys collide across objects.
    #[default]
    Leaf,
    /// Prefix plus every object key joined by `_`.
    Path,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatMetric {
    pub name: String,
    pub doc: String,
    pub value: f64,
}

/// Flattens `tree` using [`NameStyle::Leaf`].
pub fn flatten<'a>(name_prefix: &str, tree: &'a Value, doc_prefix: &str) -> Flatten<'a> {
    Flatten::new(name_prefix, tree, doc_prefix, NameStyle::Leaf)
}

pub fn flatten_with_style<'a>(
    name_prefix: &str,
    tree: &'a Value,
    doc_prefix: &str,
    style: NameStyle,
) -> Flatten<'a> {
    Flatten::new(name_prefix, tree, doc_prefix, style)
}

enum Entries<'a> {
    Object(serde_json::map::Iter<'a>),
    Array(std::slice::Iter<'a, Value>),
}

struct Frame<'a> {
    entries: Entries<'a>,
    name_prefix: String,
    doc_prefix: String,
}

impl<'a> Frame<'a> {
    fn object(map: &'a Map<String, Value>, name_prefix: String, doc_prefix: String) -> Self {
        Self {
            entries: Entries::Object(map.iter()),
            name_prefix,
            doc_prefix,
        }
    }

    fn array(items: &'a [Value], name_prefix: String, doc_prefix: String) -> Self {
        Self {
            entries: Entries::Array(items.iter()),
            name_prefix,
            doc_prefix,
        }
    }
}

/// Lazy depth-first iterator returned by [`flatten`].
pub struct Flatten<'a> {
    stack: Vec<Frame<'a>>,
    style: NameStyle,
}

impl<'a> Flatten<'a> {
    fn new(name_prefix: &str, tree: &'a Value, doc_prefix: &str, style: NameStyle) -> Self {
        let root = match tree {
            Value::Object(map) => Some(Frame::object(map, name_prefix.into(), doc_prefix.into())),
            Value::Array(items) => Some(Frame::array(items, name_prefix.into(), doc_prefix.into())),
            _ => None,
        };
        Self {
            stack: root.into_iter().collect(),
            style,
        }
    }

}

fn child_prefix(style: NameStyle, name_prefix: &str, key: &str) -> String {
    match style {
        NameStyle::Leaf => name_prefix.to_string(),
        NameStyle::Path => format!("{name_prefix}{key}_"),
    }
}

fn join_doc(doc_prefix: &str, key: &str) -> String {
    format!("{doc_prefix} {key}").trim().to_string()
}

impl Iterator for Flatten<'_> {
    type Item = FlatMetric;

    fn next(&mut self) -> Option<Self::Item> {
        let style = self.style;
        loop {
            let frame = self.stack.last_mut()?;
            let child = match &mut frame.entries {
                Entries::Object(entries) => {
                    let Some((key, value)) = entries.next() else {
                        self.stack.pop();
                        continue;
                    };
                    if key == TIMESTAMP_KEY {
                        continue;
                    }
                    match value {
                        Value::Number(n) => {
                            let Some(value) = n.as_f64() else { continue };
                            return Some(FlatMetric {
                                name: format!("{}{key}", frame.name_prefix),
                                doc: join_doc(&frame.doc_prefix, key),
                                value,
                            });
                        }
                        Value::Object(map) => Frame::object(
                            map,
                            child_prefix(style, &frame.name_prefix, key),
                            join_doc(&frame.doc_prefix, key),
                        ),
                        Value::Array(items) => Frame::array(
                            items,
                            child_prefix(style, &frame.name_prefix, key),
                            join_doc(&frame.doc_prefix, key),
                        ),
                        _ => continue,
                    }
                }
                Entries::Array(items) => {
                    let Some(item) = items.next() else {
                        self.stack.pop();
                        continue;
                    };
                    match item {
                        Value::Object(map) => {
                            Frame::object(map, frame.name_prefix.clone(), frame.doc_prefix.clone())
                        }
                        Value::Array(nested) => {
                            Frame::array(nested, frame.name_prefix.clone(), frame.doc_prefix.clone())
                        }
                        // scalar array elements carry no key to name them by
                        _ => continue,
                    }
                }
            };
            self.stack.push(child);
        }
    }
}
