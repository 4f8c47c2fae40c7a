//! Replicated entities.

use crate::style::Style;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Entity identity. Unique within a world and never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the session prefix, if there is one. Used to name auxiliary surface
    /// resources.
    pub fn short(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((_, short)) => short,
            None => &self.0,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

/// A reference to a behavior: either a capability name or a dotted library path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorSource {
    Capability(String),
    Library(String),
}

impl BehaviorSource {
    pub fn parse(text: &str) -> Option<BehaviorSource> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else if text.contains('.') {
            Some(BehaviorSource::Library(text.to_string()))
        } else {
            Some(BehaviorSource::Capability(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BehaviorSource::Capability(s) | BehaviorSource::Library(s) => s,
        }
    }

    /// The capability name this source is expected to resolve to (the last path segment).
    pub fn capability_name(&self) -> &str {
        match self {
            BehaviorSource::Capability(name) => name,
            BehaviorSource::Library(path) => path.rsplit('.').next().unwrap_or(path),
        }
    }
}

impl From<&str> for BehaviorSource {
    fn from(text: &str) -> Self {
        if text.contains('.') {
            BehaviorSource::Library(text.to_string())
        } else {
            BehaviorSource::Capability(text.to_string())
        }
    }
}

/// An operation reference: `Capability.operation` or a bare built-in `operation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub capability: Option<String>,
    pub operation: String,
}

impl HandlerSpec {
    pub fn new(capability: Option<&str>, operation: &str) -> HandlerSpec {
        HandlerSpec {
            capability: capability.map(str::to_string),
            operation: operation.to_string(),
        }
    }

    pub fn parse(text: &str) -> HandlerSpec {
        match text.split_once('.') {
            Some((capability, operation)) => HandlerSpec::new(Some(capability), operation),
            None => HandlerSpec::new(None, text),
        }
    }

    /// Parses a spec given from inside a capability: bare names refer to that capability.
    pub fn qualified(default_capability: Option<&str>, text: &str) -> HandlerSpec {
        let mut spec = HandlerSpec::parse(text);
        if spec.capability.is_none() {
            spec.capability = default_capability.map(str::to_string);
        }
        spec
    }
}

impl fmt::Display for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.capability {
            Some(capability) => write!(f, "{}.{}", capability, self.operation),
            None => f.write_str(&self.operation),
        }
    }
}

/// A surface event bound to an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBinding {
    pub spec: HandlerSpec,
    pub capture: bool,
}

/// A subscription registered by an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Listener {
    pub scope: Option<String>,
    pub event: String,
}

/// A node in the replicated tree.
///
/// Entities are owned by the [`World`](crate::World); all mutation goes through it so that the
/// reverse index and the dirty set stay consistent.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) kind: String,
    pub(crate) seq: u64,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
    pub(crate) style: Style,
    pub(crate) dom_id: Option<String>,
    pub(crate) class_list: Vec<String>,
    pub(crate) content: Option<String>,
    pub(crate) attributes: BTreeMap<String, Value>,
    pub(crate) event_bindings: BTreeMap<String, EventBinding>,
    pub(crate) model_behaviors: Vec<BehaviorSource>,
    pub(crate) view_behaviors: Vec<BehaviorSource>,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) top_child: bool,
}

impl Entity {
    pub(crate) fn new(id: EntityId, kind: &str, seq: u64) -> Entity {
        Entity {
            id,
            kind: kind.to_string(),
            seq,
            parent: None,
            children: Vec::new(),
            style: Style::new(),
            dom_id: None,
            class_list: Vec::new(),
            content: None,
            attributes: BTreeMap::new(),
            event_bindings: BTreeMap::new(),
            model_behaviors: Vec::new(),
            view_behaviors: Vec::new(),
            listeners: Vec::new(),
            top_child: false,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn parent(&self) -> Option<&EntityId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn dom_id(&self) -> Option<&str> {
        self.dom_id.as_deref()
    }

    pub fn class_list(&self) -> &[String] {
        &self.class_list
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_list.iter().any(|c| c == class)
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn event_bindings(&self) -> &BTreeMap<String, EventBinding> {
        &self.event_bindings
    }

    pub fn model_behaviors(&self) -> &[BehaviorSource] {
        &self.model_behaviors
    }

    pub fn view_behaviors(&self) -> &[BehaviorSource] {
        &self.view_behaviors
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn is_top_child(&self) -> bool {
        self.top_child
    }

    /// Text dump of identity, style classes and attributes for inspection tools.
    pub fn scripting_info(&self) -> String {
        let mut out = String::new();
        out.push_str("id:\n");
        out.push_str(self.dom_id.as_deref().unwrap_or(""));
        out.push_str("\nclasses:\n");
        out.push_str(&self.class_list.join(","));
        out.push('\n');
        out.push_str("props:\n");
        for (key, value) in &self.attributes {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(&value.to_string());
            out.push('\n');
        }
        out
    }
}

/// Parsed form of [`Entity::scripting_info`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptingInfo {
    pub dom_id: Option<String>,
    pub classes: Vec<String>,
    pub props: BTreeMap<String, Value>,
}

impl ScriptingInfo {
    /// Parses the inspection text. Property lines whose value is not valid JSON are skipped.
    /// An empty id line means no dom id.
    pub fn parse(text: &str) -> ScriptingInfo {
        #[derive(Clone, Copy)]
        enum Section {
            None,
            Id,
            Classes,
            Props,
        }

        let mut info = ScriptingInfo::default();
        let mut section = Section::None;
        for line in text.lines() {
            match line {
                "id:" => section = Section::Id,
                "classes:" => section = Section::Classes,
                "props:" => section = Section::Props,
                _ if line.trim().is_empty() => (),
                _ => match section {
                    Section::None => (),
                    Section::Id => info.dom_id = Some(line.trim().to_string()),
                    Section::Classes => info.classes.extend(
                        line.split(',')
                            .map(str::trim)
                            .filter(|class| !class.is_empty())
                            .map(str::to_string),
                    ),
                    Section::Props => {
                        let parsed = line.split_once(": ").and_then(|(key, value)| {
                            serde_json::from_str(value.trim())
                                .ok()
                                .map(|value| (key.trim().to_string(), value))
                        });
                        match parsed {
                            Some((key, value)) => {
                                info.props.insert(key, value);
                            }
                            None => tracing::warn!(line, "skipping malformed property line"),
                        }
                    }
                },
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn handler_specs() {
        assert_eq!(
            HandlerSpec::parse("Counter.increment"),
            HandlerSpec::new(Some("Counter"), "increment")
        );
        assert_eq!(HandlerSpec::parse("remove"), HandlerSpec::new(None, "remove"));
        assert_eq!(
            HandlerSpec::qualified(Some("Drag"), "down"),
            HandlerSpec::new(Some("Drag"), "down")
        );
        assert_eq!(
            HandlerSpec::qualified(Some("Drag"), "Other.up").to_string(),
            "Other.up"
        );
    }

    #[test]
    fn behavior_sources() {
        assert_eq!(
            BehaviorSource::parse("counter.Counter"),
            Some(BehaviorSource::Library("counter.Counter".into()))
        );
        assert_eq!(
            BehaviorSource::parse("Counter"),
            Some(BehaviorSource::Capability("Counter".into()))
        );
        assert_eq!(BehaviorSource::parse("  "), None);
        assert_eq!(
            BehaviorSource::from("a.b.Counter").capability_name(),
            "Counter"
        );
    }

    #[test]
    fn short_ids() {
        assert_eq!(EntityId::from("session/0004").short(), "0004");
        assert_eq!(EntityId::from("0004").short(), "0004");
    }

    #[test]
    fn scripting_info_round_trip() {
        let mut entity = Entity::new(EntityId::from("0002"), "Element", 2);
        entity.dom_id = Some("card".into());
        entity.class_list = vec!["a".into(), "b".into()];
        entity.attributes.insert("count".into(), json!(3));
        entity.attributes.insert("name".into(), json!("x"));

        let text = entity.scripting_info();
        assert_eq!(
            text,
            "id:\ncard\nclasses:\na,b\nprops:\ncount: 3\nname: \"x\"\n"
        );

        let info = ScriptingInfo::parse(&text);
        assert_eq!(info.dom_id.as_deref(), Some("card"));
        assert_eq!(info.classes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(info.props.get("count"), Some(&json!(3)));
        assert_eq!(info.props.get("name"), Some(&json!("x")));
    }
}
