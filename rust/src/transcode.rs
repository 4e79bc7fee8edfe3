//! Conversion between nested mappings (parser output) and Node trees.
//!
//! `decode` walks a mapping post-order: child mappings become child Nodes
//! before the value processor sees them, so a processor always receives the
//! final shape of the value. `encode` is the inverse and skips private
//! attributes, i.e. names that both start and end with [`PRIVATE_MARKER`].
//! [`rows`] flattens a mapping into one row per leaf for tabular listings.

use std::slice;

use serde_json::{map, Value as JsonValue};

use crate::node::{Node, Value};

/// Nested mapping as produced by the JSON and TOML parsers.
pub type Mapping = serde_json::Map<String, JsonValue>;

/// Name given to the root Node of a decoded tree.
pub const ROOT_NAME: &str = "Root";

pub const PRIVATE_MARKER: char = '_';

/// Per-key hook run on every decoded value. `None` keeps the value as it was.
pub trait ValueProcessor {
    fn process(&self, key: &str, value: &Value) -> Option<Value>;
}

impl<F> ValueProcessor for F
where
    F: Fn(&str, &Value) -> Option<Value>,
{
    fn process(&self, key: &str, value: &Value) -> Option<Value> {
        self(key, value)
    }
}

/// Decodes `mapping` without touching any value.
pub fn decode(mapping: &Mapping) -> Node {
    decode_with(mapping, &|_: &str, _: &Value| -> Option<Value> { None })
}

/// Decodes `mapping` into a fresh root Node, running `processor` on every
/// key/value pair after its children are resolved.
pub fn decode_with(mapping: &Mapping, processor: &dyn ValueProcessor) -> Node {
    let mut root = Node::new(ROOT_NAME);
    root.merge(decode_node("", mapping, processor));
    root
}

fn decode_node(key: &str, mapping: &Mapping, processor: &dyn ValueProcessor) -> Node {
    let mut node = Node::named(key);
    for (name, raw) in mapping {
        let value = decode_value(name, raw, processor);
        let value = processor.process(name, &value).unwrap_or(value);
        node.set(name.as_str(), value);
    }
    node
}

/// Mappings nested in sequences are decoded too and carry the key of the
/// sequence that holds them.
pub(crate) fn decode_value(key: &str, raw: &JsonValue, processor: &dyn ValueProcessor) -> Value {
    match raw {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(flag) => Value::Bool(*flag),
        JsonValue::Number(number) => Value::Number(number.clone()),
        JsonValue::String(text) => Value::String(text.clone()),
        JsonValue::Array(items) => Value::List(
            items
                .iter()
                .map(|item| decode_value(key, item, processor))
                .collect(),
        ),
        JsonValue::Object(mapping) => Value::Node(decode_node(key, mapping, processor)),
    }
}

/// Flattens a Node tree back into a mapping keyed by attribute name.
pub fn encode(node: &Node) -> Mapping {
    node.iter()
        .filter(|(name, _)| !is_private(name))
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

pub fn encode_value(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(flag) => JsonValue::Bool(*flag),
        Value::Number(number) => JsonValue::Number(number.clone()),
        Value::String(text) => JsonValue::String(text.clone()),
        Value::List(items) => JsonValue::Array(items.iter().map(encode_value).collect()),
        Value::Node(node) => JsonValue::Object(encode(node)),
    }
}

/// True for names excluded from the encoded form.
pub fn is_private(name: &str) -> bool {
    name.starts_with(PRIVATE_MARKER) && name.ends_with(PRIVATE_MARKER)
}

/// One leaf of a flattened mapping: the keys leading to it, outermost first,
/// and the value stored there.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<'a> {
    pub keys: Vec<&'a str>,
    pub value: &'a JsonValue,
}

impl Row<'_> {
    /// Keys joined with `.`, the form accepted by `Node::lookup`.
    pub fn dotted(&self) -> String {
        self.keys.join(".")
    }
}

/// Depth-first iterator over the leaves of `mapping`.
///
/// Every element of a sequence gets its own row under the sequence's key;
/// mappings inside sequences are flattened further. Empty mappings and
/// empty sequences produce no rows.
pub fn rows(mapping: &Mapping) -> Rows<'_> {
    Rows {
        stack: vec![Frame::Entries {
            keys: Vec::new(),
            entries: mapping.iter(),
        }],
    }
}

pub struct Rows<'a> {
    stack: Vec<Frame<'a>>,
}

enum Frame<'a> {
    Entries {
        keys: Vec<&'a str>,
        entries: map::Iter<'a>,
    },
    Items {
        keys: Vec<&'a str>,
        items: slice::Iter<'a, JsonValue>,
    },
}

enum Step<'a> {
    Pop,
    Push(Frame<'a>),
    Emit(Row<'a>),
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Row<'a>> {
        loop {
            let step = match self.stack.last_mut()? {
                Frame::Entries { keys, entries } => match entries.next() {
                    None => Step::Pop,
                    Some((key, value)) => {
                        let mut keys = keys.clone();
                        keys.push(key.as_str());
                        descend(keys, value)
                    }
                },
                Frame::Items { keys, items } => match items.next() {
                    None => Step::Pop,
                    Some(JsonValue::Object(mapping)) => Step::Push(Frame::Entries {
                        keys: keys.clone(),
                        entries: mapping.iter(),
                    }),
                    Some(value) => Step::Emit(Row {
                        keys: keys.clone(),
                        value,
                    }),
                },
            };
            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Push(frame) => self.stack.push(frame),
                Step::Emit(row) => return Some(row),
            }
        }
    }
}

fn descend<'a>(keys: Vec<&'a str>, value: &'a JsonValue) -> Step<'a> {
    match value {
        JsonValue::Object(mapping) => Step::Push(Frame::Entries {
            keys,
            entries: mapping.iter(),
        }),
        JsonValue::Array(items) => Step::Push(Frame::Items {
            keys,
            items: items.iter(),
        }),
        leaf => Step::Emit(Row { keys, value: leaf }),
    }
}
