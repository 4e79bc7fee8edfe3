//! In-memory configuration tree. A `Node` is one level of the hierarchy and
//! owns an open set of named attributes; deeper levels are child Nodes owned
//! exclusively by their parent, so the structure is always a tree.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use serde_json::Number;

use crate::paths::PathNormalizer;
use crate::transcode::{self, ValueProcessor};

/// Attribute set of a single Node, keyed by attribute name.
pub type Attributes = BTreeMap<String, Value>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Node(Node),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(number) => number.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(number) => number.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    /// Renders the value as compact JSON.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", transcode::encode_value(self))
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Number(number.into())
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Value::Number(number.into())
    }
}

impl From<u64> for Value {
    fn from(number: u64) -> Self {
        Value::Number(number.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and are kept as their string form.
    fn from(number: f64) -> Self {
        Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(number.to_string()))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<serde_json::Value> for Value {
    /// JSON objects become child Nodes, decoded with path normalization.
    fn from(raw: serde_json::Value) -> Self {
        transcode::decode_value("", &raw, &PathNormalizer)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        transcode::encode_value(value)
    }
}

/// One level of the configuration hierarchy.
///
/// The name is the capitalized key that introduced the Node. It is kept for
/// debugging only and does not take part in equality.
#[derive(Debug, Clone, Default)]
pub struct Node {
    name: String,
    attrs: Attributes,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
        }
    }

    /// Builds an empty Node named after the key that introduces it.
    pub fn named(key: &str) -> Self {
        Self::new(capitalize(key))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.attrs.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    /// Child Node stored under `key`, if that attribute is a Node.
    pub fn child(&self, key: &str) -> Option<&Node> {
        self.get(key).and_then(Value::as_node)
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.get_mut(key).and_then(Value::as_node_mut)
    }

    /// Stores `value` as-is, without running any processor. Returns the
    /// value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attrs.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attrs.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.attrs.clear();
    }

    /// Reads a value through a dotted path such as `project.build.type`.
    pub fn lookup(&self, dotted: &str) -> Option<&Value> {
        match dotted.rsplit_once('.') {
            Some((parents, leaf)) => {
                let mut node = self;
                for segment in parents.split('.') {
                    node = node.child(segment)?;
                }
                node.get(leaf)
            }
            None => self.get(dotted),
        }
    }

    pub fn lookup_mut(&mut self, dotted: &str) -> Option<&mut Value> {
        match dotted.rsplit_once('.') {
            Some((parents, leaf)) => {
                let mut node = self;
                for segment in parents.split('.') {
                    node = node.child_mut(segment)?;
                }
                node.get_mut(leaf)
            }
            None => self.get_mut(dotted),
        }
    }

    /// Writes a value through a dotted path. Missing intermediate levels are
    /// created as empty Nodes and a non-Node intermediate is replaced by one.
    /// The leaf value goes through path normalization like `update`.
    pub fn insert_path(&mut self, dotted: &str, value: impl Into<Value>) -> Option<Value> {
        let (node, leaf) = match dotted.rsplit_once('.') {
            Some((parents, leaf)) => {
                let mut node = self;
                for segment in parents.split('.') {
                    node = node.ensure_child(segment);
                }
                (node, leaf)
            }
            None => (self, dotted),
        };
        let value = value.into();
        let value = PathNormalizer.process(leaf, &value).unwrap_or(value);
        node.set(leaf, value)
    }

    /// Merges `data` into this Node with path normalization applied to every
    /// value. Existing attributes with the same name are overwritten.
    pub fn update<I, K, V>(&mut self, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let overrides = data
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.update_with(None, overrides, &PathNormalizer, None);
    }

    /// Full merge: `mapping` and `overrides` are combined (overrides win on
    /// conflicting names), every value goes through `processor`, and then
    /// through `processor_cb` when one is given. A processor returning `None`
    /// keeps the value it was handed.
    pub fn update_with(
        &mut self,
        mapping: Option<Attributes>,
        overrides: Attributes,
        processor: &dyn ValueProcessor,
        processor_cb: Option<&dyn ValueProcessor>,
    ) {
        let mut data = mapping.unwrap_or_default();
        data.extend(overrides);

        for (key, value) in data {
            let value = processor.process(&key, &value).unwrap_or(value);
            let value = match processor_cb {
                Some(callback) => callback.process(&key, &value).unwrap_or(value),
                None => value,
            };
            self.attrs.insert(key, value);
        }
    }

    /// Moves every attribute of `other` into this Node, last write wins.
    pub fn merge(&mut self, other: Node) {
        self.attrs.extend(other.attrs);
    }

    /// Attaches a new child Node under `name`, optionally pre-populated from
    /// `attrs`, and returns it for further growth.
    pub fn add_child(&mut self, name: &str, attrs: Option<Attributes>) -> &mut Node {
        let mut child = Node::named(name);
        if let Some(attrs) = attrs {
            child.update(attrs);
        }
        self.attach(name, child)
    }

    fn ensure_child(&mut self, key: &str) -> &mut Node {
        let slot = self
            .attrs
            .entry(key.to_string())
            .or_insert_with(|| Value::Node(Node::named(key)));
        node_in(slot, key)
    }

    fn attach(&mut self, key: &str, child: Node) -> &mut Node {
        let slot = match self.attrs.entry(key.to_string()) {
            btree_map::Entry::Occupied(mut entry) => {
                entry.insert(Value::Node(child));
                entry.into_mut()
            }
            btree_map::Entry::Vacant(entry) => entry.insert(Value::Node(child)),
        };
        node_in(slot, key)
    }
}

/// The Node held in `slot`. A non-Node value is replaced by an empty Node
/// named after `key`.
fn node_in<'a>(slot: &'a mut Value, key: &str) -> &'a mut Node {
    match slot {
        Value::Node(node) => node,
        other => {
            *other = Value::Node(Node::named(key));
            node_in(other, key)
        }
    }
}

impl<'a> IntoIterator for &'a Node {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Attributes, Node, Value};
    use crate::paths::{normalize_path, PathNormalizer};

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), Value::from(*value)))
            .collect()
    }

    #[test]
    fn update_accepts_both_merge_forms() {
        let mut node = Node::named("project");
        node.update([("version", "1.0.0")]);
        node.update_with(
            Some(attrs(&[("foo", "bar")])),
            attrs(&[("baz", "fee")]),
            &PathNormalizer,
            None,
        );

        assert_eq!(node.len(), 3);
        assert_eq!(node.get("version").unwrap(), &"1.0.0");
        assert_eq!(node.get("foo").unwrap(), &"bar");
        assert_eq!(node.get("baz").unwrap(), &"fee");
    }

    #[test]
    fn overrides_win_over_mapping() {
        let mut node = Node::default();
        node.update_with(
            Some(attrs(&[("mode", "debug"), ("jobs", "4")])),
            attrs(&[("mode", "release")]),
            &PathNormalizer,
            None,
        );
        assert_eq!(node.get("mode").unwrap(), &"release");
        assert_eq!(node.get("jobs").unwrap(), &"4");
    }

    #[test]
    fn update_normalizes_path_keys() {
        let mut node = Node::default();
        node.update([("output_path", "build/../out"), ("label", "build/../out")]);

        assert_eq!(
            node.get("output_path").unwrap(),
            &Value::String(normalize_path("out"))
        );
        assert_eq!(node.get("label").unwrap(), &"build/../out");
    }

    #[test]
    fn processor_cb_replaces_normalized_value() {
        let shout = |key: &str, value: &Value| -> Option<Value> {
            if key == "name" {
                value.as_str().map(|text| Value::from(text.to_uppercase()))
            } else {
                None
            }
        };
        let mut node = Node::default();
        node.update_with(
            None,
            attrs(&[("name", "squad"), ("path", "/tmp/../srv")]),
            &PathNormalizer,
            Some(&shout),
        );

        assert_eq!(node.get("name").unwrap(), &"SQUAD");
        assert_eq!(
            node.get("path").unwrap(),
            &Value::String(normalize_path("/srv"))
        );
    }

    #[test]
    fn custom_processor_replaces_path_normalizer() {
        let keep = |_: &str, _: &Value| -> Option<Value> { None };
        let mut node = Node::default();
        node.update_with(None, attrs(&[("path", "~/raw")]), &keep, None);
        assert_eq!(node.get("path").unwrap(), &"~/raw");
    }

    #[test]
    fn add_child_grows_the_tree() {
        let mut root = Node::named("root");
        let class_attr = root.add_child("class_attr", None);
        assert!(class_attr.is_empty());
        assert_eq!(class_attr.name(), "Class_attr");

        class_attr.add_child("sub_attr", Some(attrs(&[("key", "value")])));

        let sub = root
            .child("class_attr")
            .and_then(|node| node.child("sub_attr"))
            .expect("nested child");
        assert_eq!(sub.get("key").unwrap(), &"value");
        assert_eq!(root.lookup("class_attr.sub_attr.key").unwrap(), &"value");
    }

    #[test]
    fn dotted_lookup_and_insert() {
        let mut root = Node::default();
        root.insert_path("project.build.type", "Debug");
        root.set("flat", 3);

        assert_eq!(root.lookup("project.build.type").unwrap(), &"Debug");
        assert_eq!(root.lookup("flat").and_then(Value::as_i64), Some(3));
        assert!(root.lookup("project.missing.type").is_none());
        assert!(root.lookup("flat.deeper").is_none());

        if let Some(value) = root.lookup_mut("project.build.type") {
            *value = Value::from("Release");
        }
        assert_eq!(root.lookup("project.build.type").unwrap(), &"Release");

        root.insert_path("flat.inner", true);
        assert_eq!(root.lookup("flat.inner").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn intermediate_slots_keep_nodes_and_replace_scalars() {
        let mut root = Node::default();
        root.insert_path("build.type", "Debug");
        root.insert_path("build.output", "exec");
        assert_eq!(root.lookup("build.type").unwrap(), &"Debug");
        assert_eq!(root.child("build").map(Node::len), Some(2));
        assert_eq!(root.child("build").unwrap().name(), "Build");

        root.set("mode", "fast");
        root.insert_path("mode.level", 3);
        let mode = root.child("mode").expect("scalar replaced by a node");
        assert_eq!(mode.name(), "Mode");
        assert_eq!(mode.get("level").and_then(Value::as_i64), Some(3));

        root.set("slot", 1);
        let slot = root.add_child("slot", Some(attrs(&[("inner", "x")])));
        slot.set("more", true);
        assert_eq!(root.lookup("slot.inner").unwrap(), &"x");
        assert_eq!(root.lookup("slot.more").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn contains_and_remove() {
        let mut node = Node::default();
        assert!(!node.contains("attr"));
        node.update([("attr", "attrval")]);
        assert!(node.contains("attr"));
        assert_eq!(node.remove("attr"), Some(Value::from("attrval")));
        assert!(!node.contains("attr"));
    }

    #[test]
    fn equality_ignores_name() {
        let mut left = Node::new("Left");
        let mut right = Node::new("Right");
        left.set("key", "value");
        right.set("key", "value");
        assert_eq!(left, right);

        right.set("other", Value::Null);
        assert_ne!(left, right);
    }

    #[test]
    fn merge_overwrites_existing_attributes() {
        let mut base = Node::default();
        base.set("keep", 1);
        base.set("replace", "old");

        let mut incoming = Node::default();
        incoming.set("replace", "new");
        incoming.set("added", false);

        base.merge(incoming);
        assert_eq!(base.get("keep").and_then(Value::as_i64), Some(1));
        assert_eq!(base.get("replace").unwrap(), &"new");
        assert_eq!(base.get("added").and_then(Value::as_bool), Some(false));
    }

    #[test]
    fn json_objects_convert_into_nodes() {
        let value = Value::from(serde_json::json!({"inner": {"count": 2}}));
        let node = value.as_node().expect("object becomes a node");
        assert_eq!(node.lookup("inner.count").and_then(Value::as_u64), Some(2));
        assert_eq!(value.to_string(), r#"{"inner":{"count":2}}"#);
    }

    #[test]
    fn non_finite_floats_fall_back_to_strings() {
        assert_eq!(Value::from(f64::NAN), "NaN");
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }
}
