//! Behavior libraries.
//!
//! A library is a JSON object tree whose leaves are capability names, addressed by dotted
//! paths: `{"widgets": {"drag": "Draggable"}}` maps `widgets.drag` to `Draggable`. Entities may
//! carry their own library under the `"library"` attribute; the world has a global one.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    root: Map<String, Value>,
}

impl Library {
    pub fn new() -> Library {
        Library::default()
    }

    /// Wraps an existing tree. Returns `None` if the value is not an object.
    pub fn from_value(value: &Value) -> Option<Library> {
        value.as_object().map(|root| Library { root: root.clone() })
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Sets the leaf at `path` to `name`, creating intermediate objects as needed.
    pub fn add(&mut self, path: &str, name: &str) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = match segments.pop() {
            Some(leaf) if !leaf.is_empty() => leaf,
            _ => return,
        };
        let mut node = &mut self.root;
        for segment in segments {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            node = match entry.as_object_mut() {
                Some(map) => map,
                None => return,
            };
        }
        node.insert(leaf.to_string(), Value::String(name.to_string()));
    }

    /// Adds every name under the `path` prefix, keyed by the name itself.
    pub fn add_library(&mut self, path: &str, names: &[&str]) {
        for name in names {
            self.add(&format!("{}.{}", path, name), name);
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        let mut segments = path.split('.');
        let mut value = self.root.get(segments.next()?)?;
        for segment in segments {
            value = value.as_object()?.get(segment)?;
        }
        value.as_str()
    }

    /// Whether the library has a top-level entry named `base`.
    pub fn has(&self, base: &str) -> bool {
        self.root.contains_key(base)
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop()?;
        let mut node = &mut self.root;
        for segment in segments {
            node = node.get_mut(segment)?.as_object_mut()?;
        }
        node.remove(leaf)
    }
}
