//! The replicated world: entity arena, reverse index, factory and mutations.
//!
//! Every replica builds its world from the same messages in the same order. Nothing in here
//! reads a clock, a random source or the view side, so replicas stay identical.

use crate::capability::{CapabilityRegistry, ModelCapability, ModelOp, Resolved};
use crate::config::{Config, UnknownKinds};
use crate::dirty::{DirtySet, Drained};
use crate::entity::{BehaviorSource, Entity, EntityId, EventBinding, HandlerSpec, Listener, ScriptingInfo};
use crate::error::{StyleError, TreeError};
use crate::library::Library;
use crate::style::{self, Style, StyleValue};
use cgmath::Vector2;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

mod dispatch;
mod graph;
mod messages;
mod timeline;

pub use dispatch::{Deferred, ModelFacade};
pub use messages::{DomEvent, Message, Substrate, DOM_EVENT, VIEW_EXIT, VIEW_JOIN, WINDOW_RESIZED};

use messages::Subscriptions;
use timeline::Timeline;

/// Default entity kind.
pub const ELEMENT: &str = "Element";
/// Kind of the world root.
pub const WORLD: &str = "World";

/// Initializer for an entity kind; runs right after creation.
pub type KindInit = fn(&mut World, &EntityId);

/// The replicated entity tree.
pub struct World {
    root: EntityId,
    entities: HashMap<EntityId, Entity>,
    counter: u64,
    dirty: DirtySet,
    kinds: HashMap<String, Option<KindInit>>,
    unknown_kinds: UnknownKinds,
    registry: Arc<CapabilityRegistry<ModelOp>>,
    library: Library,
    resolved: HashMap<EntityId, Arc<Resolved<ModelOp>>>,
    builtins: Arc<ModelCapability>,
    timeline: Timeline,
    subscriptions: Subscriptions,
    participants: BTreeSet<String>,
    container_extent: Vector2<f64>,
    pending: VecDeque<Message>,
    delivering: bool,
    session_id: String,
}

impl World {
    /// Creates a world with its root entity.
    pub fn new(config: &Config, registry: Arc<CapabilityRegistry<ModelOp>>) -> World {
        let mut kinds = HashMap::new();
        kinds.insert(ELEMENT.to_string(), None);
        kinds.insert(WORLD.to_string(), None);

        let mut world = World {
            root: EntityId::from(""),
            entities: HashMap::new(),
            counter: 0,
            dirty: DirtySet::new(),
            kinds,
            unknown_kinds: config.unknown_kinds,
            registry,
            library: Library::new(),
            resolved: HashMap::new(),
            builtins: Arc::new(dispatch::builtins()),
            timeline: Timeline::default(),
            subscriptions: Subscriptions::default(),
            participants: BTreeSet::new(),
            container_extent: Vector2::new(config.container.width, config.container.height),
            pending: VecDeque::new(),
            delivering: false,
            session_id: config.session_id.clone(),
        };
        world.root = world.insert_entity(WORLD);
        world
    }

    /// Registers an entity kind for [`World::create`].
    pub fn register_kind(&mut self, name: &str, init: Option<KindInit>) {
        self.kinds.insert(name.to_string(), init);
    }

    /// Creates a detached entity of the given kind.
    pub fn create(&mut self, kind: &str) -> Result<EntityId, TreeError> {
        let (kind, init) = match self.kinds.get(kind) {
            Some(init) => (kind, *init),
            None => match self.unknown_kinds {
                UnknownKinds::Fallback => {
                    tracing::warn!(kind, "unknown entity kind, creating an {}", ELEMENT);
                    (ELEMENT, None)
                }
                UnknownKinds::Reject => return Err(TreeError::UnknownKind(kind.to_string())),
            },
        };
        let id = self.insert_entity(kind);
        if let Some(init) = init {
            init(self, &id);
        }
        Ok(id)
    }

    fn insert_entity(&mut self, kind: &str) -> EntityId {
        self.counter += 1;
        let id = EntityId::from(format!("{:04}", self.counter));
        self.entities
            .insert(id.clone(), Entity::new(id.clone(), kind, self.counter));
        self.dirty.mark(&id);
        id
    }

    /// The world root.
    pub fn root(&self) -> &EntityId {
        &self.root
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn children(&self, id: &EntityId) -> &[EntityId] {
        self.entities
            .get(id)
            .map(|entity| entity.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Participants currently joined, by view id.
    pub fn participants(&self) -> &BTreeSet<String> {
        &self.participants
    }

    pub fn container_extent(&self) -> Vector2<f64> {
        self.container_extent
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut Library {
        &mut self.library
    }

    pub fn is_dirty(&self, id: &EntityId) -> bool {
        self.dirty.contains(id)
    }

    /// Requests a full refresh on the next tick.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.mark_all();
    }

    /// Drains the dirty set. A full refresh (or the initial state) yields every entity in
    /// creation order.
    pub fn changed_elements(&mut self, full: bool) -> Vec<EntityId> {
        match self.dirty.drain(full) {
            Drained::Ids(ids) => ids,
            Drained::All => {
                let mut all: Vec<&Entity> = self.entities.values().collect();
                all.sort_by_key(|entity| entity.seq);
                all.into_iter().map(|entity| entity.id.clone()).collect()
            }
        }
    }

    /// Runs `f` on the entity and marks it dirty. Mutations on destroyed entities are ignored.
    fn update(&mut self, id: &EntityId, f: impl FnOnce(&mut Entity)) -> bool {
        match self.entities.get_mut(id) {
            Some(entity) => {
                f(entity);
                self.dirty.mark(id);
                true
            }
            None => {
                tracing::warn!(entity = %id, "ignoring mutation of destroyed entity");
                false
            }
        }
    }

    pub fn set_style(&mut self, id: &EntityId, name: &str, value: impl Into<StyleValue>) {
        let value = value.into();
        self.update(id, |entity| entity.style.set_property(name, value));
    }

    pub fn remove_style(&mut self, id: &EntityId, name: &str) {
        self.update(id, |entity| {
            entity.style.remove_property(name);
        });
    }

    /// Replaces the whole style.
    pub fn replace_style(&mut self, id: &EntityId, style: Style) {
        self.update(id, |entity| entity.style = style);
    }

    pub fn set_style_text(&mut self, id: &EntityId, text: &str) -> Result<(), StyleError> {
        let style = Style::parse(text)?;
        self.replace_style(id, style);
        Ok(())
    }

    pub fn style_text(&self, id: &EntityId) -> Option<String> {
        self.entities.get(id).map(|entity| entity.style.to_text())
    }

    pub fn set_style_classes(&mut self, id: &EntityId, classes: Option<String>) {
        self.update(id, |entity| entity.style.set_classes(classes));
    }

    /// Appends rules to the class block.
    pub fn add_style_classes(&mut self, id: &EntityId, classes: &str) {
        self.update(id, |entity| {
            let joined = match entity.style.classes() {
                Some(old) => format!("{}\n{}", old, classes),
                None => classes.to_string(),
            };
            entity.style.set_classes(Some(joined));
        });
    }

    pub fn set_transform(&mut self, id: &EntityId, components: [f64; 6]) {
        self.update(id, |entity| entity.style.set_transform(components));
    }

    /// Sets the transform from a comma-separated list of six numbers.
    pub fn set_transform_text(&mut self, id: &EntityId, text: &str) -> Result<(), StyleError> {
        let components = style::parse_transform(text)?;
        self.set_transform(id, components);
        Ok(())
    }

    pub fn set_transform_origin(&mut self, id: &EntityId, origin: &str) {
        self.update(id, |entity| entity.style.set_transform_origin(origin));
    }

    pub fn set_attribute(&mut self, id: &EntityId, name: &str, value: Value) {
        self.update(id, |entity| {
            entity.attributes.insert(name.to_string(), value);
        });
    }

    pub fn remove_attribute(&mut self, id: &EntityId, name: &str) {
        self.update(id, |entity| {
            entity.attributes.remove(name);
        });
    }

    /// Merges every key of `values` into the attributes.
    pub fn set_attributes(&mut self, id: &EntityId, values: serde_json::Map<String, Value>) {
        self.update(id, |entity| entity.attributes.extend(values));
    }

    pub fn set_dom_id(&mut self, id: &EntityId, dom_id: Option<String>) {
        self.update(id, |entity| entity.dom_id = dom_id);
    }

    pub fn set_class_list(&mut self, id: &EntityId, classes: Vec<String>) {
        self.update(id, |entity| entity.class_list = classes);
    }

    /// Adds whitespace-separated classes that are not already present.
    pub fn add_classes(&mut self, id: &EntityId, classes: &str) {
        self.update(id, |entity| {
            for class in classes.split_whitespace() {
                if !entity.has_class(class) {
                    entity.class_list.push(class.to_string());
                }
            }
        });
    }

    pub fn remove_classes(&mut self, id: &EntityId, classes: &str) {
        self.update(id, |entity| {
            let remove: Vec<&str> = classes.split_whitespace().collect();
            entity.class_list.retain(|class| !remove.contains(&class.as_str()));
        });
    }

    /// Replaces `old` with `new` in place. Returns false if `old` was not present.
    pub fn replace_class(&mut self, id: &EntityId, old: &str, new: &str) -> bool {
        let mut replaced = false;
        self.update(id, |entity| {
            if let Some(slot) = entity.class_list.iter_mut().find(|class| *class == old) {
                *slot = new.to_string();
                replaced = true;
            }
        });
        replaced
    }

    pub fn has_class(&self, id: &EntityId, class: &str) -> bool {
        self.entities
            .get(id)
            .map_or(false, |entity| entity.has_class(class))
    }

    pub fn set_content(&mut self, id: &EntityId, content: Option<String>) {
        self.update(id, |entity| entity.content = content);
    }

    /// Marks the entity as the visual root of the tree.
    ///
    /// The parent is marked too; its rendered child list excludes the top child.
    pub fn set_top_child(&mut self, id: &EntityId, top_child: bool) {
        if self.update(id, |entity| entity.top_child = top_child) {
            if let Some(parent) = self.entities.get(id).and_then(|e| e.parent.clone()) {
                self.dirty.mark(&parent);
            }
        }
    }

    /// Binds a surface event to an operation. The spec is stored as given.
    pub fn add_event_listener(&mut self, id: &EntityId, event: &str, spec: HandlerSpec, capture: bool) {
        self.update(id, |entity| {
            entity
                .event_bindings
                .insert(event.to_string(), EventBinding { spec, capture });
        });
    }

    pub fn remove_event_listener(&mut self, id: &EntityId, event: &str) {
        self.update(id, |entity| {
            entity.event_bindings.remove(event);
        });
    }

    /// Registers a publish domain used by [`World::publish_to_all`]. Duplicates are ignored.
    pub fn add_domain(&mut self, id: &EntityId, scope: Option<&str>, event: &str) {
        let listener = Listener {
            scope: scope.map(str::to_string),
            event: event.to_string(),
        };
        self.update(id, |entity| {
            if !entity.listeners.contains(&listener) {
                entity.listeners.push(listener);
            }
        });
    }

    /// Registered domains as JSON, or `None` if there are none.
    pub fn listeners_info(&self, id: &EntityId) -> Option<String> {
        let entity = self.entities.get(id)?;
        if entity.listeners.is_empty() {
            return None;
        }
        serde_json::to_string(&entity.listeners).ok()
    }

    pub fn set_listeners_info(&mut self, id: &EntityId, text: &str) -> Result<(), serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let listeners: Vec<Listener> = serde_json::from_str(text)?;
        self.update(id, |entity| entity.listeners = listeners);
        Ok(())
    }

    pub fn scripting_info(&self, id: &EntityId) -> Option<String> {
        self.entities.get(id).map(Entity::scripting_info)
    }

    /// Applies edited inspection text: dom id, class list and the listed attributes.
    pub fn set_scripting_info(&mut self, id: &EntityId, text: &str) {
        let info = ScriptingInfo::parse(text);
        self.update(id, |entity| {
            entity.dom_id = info.dom_id;
            entity.class_list = info.classes;
            entity.attributes.extend(info.props);
        });
    }

    /// Finds a descendant (or the entity itself) by `#dom-id`. Other selectors match nothing.
    pub fn query_selector(&self, id: &EntityId, selector: &str) -> Option<EntityId> {
        let dom_id = selector.strip_prefix('#')?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let entity = self.entities.get(current)?;
            if entity.dom_id.as_deref() == Some(dom_id) {
                return Some(current.clone());
            }
            stack.extend(entity.children.iter().rev());
        }
        None
    }

    pub fn set_view_behaviors(&mut self, id: &EntityId, sources: Vec<BehaviorSource>) {
        if self.entities.get(id).map(|e| &e.view_behaviors) == Some(&sources) {
            return;
        }
        self.update(id, |entity| entity.view_behaviors = sources);
    }

    /// Appends view behaviors, skipping capabilities already listed.
    pub fn add_view_behaviors(&mut self, id: &EntityId, sources: Vec<BehaviorSource>) {
        let mut list = match self.entities.get(id) {
            Some(entity) => entity.view_behaviors.clone(),
            None => return,
        };
        for source in sources {
            if !list
                .iter()
                .any(|old| old.capability_name() == source.capability_name())
            {
                list.push(source);
            }
        }
        self.set_view_behaviors(id, list);
    }

    /// Walks up from `id` looking for a `"library"` attribute that knows the path's first
    /// segment, then falls back to the global library.
    pub fn resolve_library(&self, id: &EntityId, path: &str) -> Option<String> {
        let (base, _) = path.split_once('.')?;
        let mut current = self.entities.get(id);
        while let Some(entity) = current {
            if let Some(library) = entity.attributes.get("library").and_then(Library::from_value) {
                if library.has(base) {
                    return library.get(path).map(str::to_string);
                }
            }
            current = entity.parent.as_ref().and_then(|p| self.entities.get(p));
        }
        self.library.get(path).map(str::to_string)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    pub(crate) fn world() -> World {
        World::new(&Config::default(), Arc::new(CapabilityRegistry::new()))
    }

    #[test]
    fn ids_come_from_a_counter() {
        let mut world = world();
        assert_eq!(world.root().as_str(), "0001");
        let a = world.create(ELEMENT).unwrap();
        let b = world.create(ELEMENT).unwrap();
        assert_eq!(a.as_str(), "0002");
        assert_eq!(b.as_str(), "0003");
    }

    #[test]
    fn unknown_kinds() {
        let mut world = world();
        let id = world.create("Sprocket").unwrap();
        assert_eq!(world.get(&id).map(Entity::kind), Some(ELEMENT));

        let config = Config {
            unknown_kinds: UnknownKinds::Reject,
            ..Config::default()
        };
        let mut strict = World::new(&config, Arc::new(CapabilityRegistry::new()));
        assert_eq!(
            strict.create("Sprocket"),
            Err(TreeError::UnknownKind("Sprocket".into()))
        );
    }

    #[test]
    fn kind_initializers_run_on_create() {
        fn init_card(world: &mut World, id: &EntityId) {
            world.add_classes(id, "card");
        }
        let mut world = world();
        world.register_kind("Card", Some(init_card));
        let id = world.create("Card").unwrap();
        assert!(world.has_class(&id, "card"));
    }

    #[test]
    fn first_drain_is_everything() {
        let mut world = world();
        let a = world.create(ELEMENT).unwrap();
        let b = world.create(ELEMENT).unwrap();
        assert_eq!(
            world.changed_elements(false),
            vec![world.root().clone(), a.clone(), b.clone()]
        );
        assert!(world.changed_elements(false).is_empty());

        world.set_style(&b, "color", "red");
        world.set_attribute(&a, "x", json!(1));
        world.set_style(&b, "width", "1px");
        assert_eq!(world.changed_elements(false), vec![b, a]);
    }

    #[test]
    fn class_helpers() {
        let mut world = world();
        let id = world.create(ELEMENT).unwrap();
        world.add_classes(&id, "a b");
        world.add_classes(&id, "b c");
        assert_eq!(world.get(&id).unwrap().class_list(), ["a", "b", "c"]);
        assert!(world.replace_class(&id, "b", "x"));
        assert!(!world.replace_class(&id, "b", "y"));
        world.remove_classes(&id, "a c");
        assert_eq!(world.get(&id).unwrap().class_list(), ["x"]);
    }

    #[test]
    fn style_text_and_classes() {
        let mut world = world();
        let id = world.create(ELEMENT).unwrap();
        world
            .set_style_text(&id, "width: 10px;\n.a { color: red; }")
            .unwrap();
        world.add_style_classes(&id, ".b { color: blue; }");
        assert_eq!(
            world.style_text(&id).unwrap(),
            "width: 10px;\n.a { color: red; }\n.b { color: blue; }"
        );

        world.set_transform_text(&id, "1,0,0,1,4,5").unwrap();
        assert!(world.set_transform_text(&id, "1,0").is_err());
        assert_eq!(
            world.get(&id).unwrap().style().property(style::TRANSFORM),
            Some(&StyleValue::Json(json!([1.0, 0.0, 0.0, 1.0, 4.0, 5.0])))
        );
    }

    #[test]
    fn query_selector_by_dom_id() {
        let mut world = world();
        let root = world.root().clone();
        let a = world.create(ELEMENT).unwrap();
        let b = world.create(ELEMENT).unwrap();
        world.append_child(&root, &a).unwrap();
        world.append_child(&a, &b).unwrap();
        world.set_dom_id(&b, Some("canvas".into()));

        assert_eq!(world.query_selector(&root, "#canvas"), Some(b));
        assert_eq!(world.query_selector(&root, "#nothing"), None);
        assert_eq!(world.query_selector(&root, ".canvas"), None);
    }

    #[test]
    fn scripting_and_listener_info() {
        let mut world = world();
        let id = world.create(ELEMENT).unwrap();
        world.set_scripting_info(&id, "id:\nbox\nclasses:\na, b\nprops:\nsize: 4\n");
        let entity = world.get(&id).unwrap();
        assert_eq!(entity.dom_id(), Some("box"));
        assert_eq!(entity.class_list(), ["a", "b"]);
        assert_eq!(entity.attribute("size"), Some(&json!(4)));

        assert_eq!(world.listeners_info(&id), None);
        world.add_domain(&id, Some("chat"), "said");
        world.add_domain(&id, Some("chat"), "said");
        world.add_domain(&id, None, "changed");
        let info = world.listeners_info(&id).unwrap();
        assert_eq!(
            info,
            r#"[{"scope":"chat","event":"said"},{"scope":null,"event":"changed"}]"#
        );

        let other = world.create(ELEMENT).unwrap();
        world.set_listeners_info(&other, &info).unwrap();
        assert_eq!(world.get(&other).unwrap().listeners().len(), 2);
    }

    #[test]
    fn library_lookup_walks_ancestors() {
        let mut world = world();
        let root = world.root().clone();
        let parent = world.create(ELEMENT).unwrap();
        let child = world.create(ELEMENT).unwrap();
        world.append_child(&root, &parent).unwrap();
        world.append_child(&parent, &child).unwrap();
        world.library_mut().add("widgets.drag", "GlobalDrag");
        world.library_mut().add("other.thing", "Thing");
        world.set_attribute(&parent, "library", json!({"widgets": {"drag": "LocalDrag"}}));

        assert_eq!(
            world.resolve_library(&child, "widgets.drag").as_deref(),
            Some("LocalDrag")
        );
        assert_eq!(
            world.resolve_library(&child, "other.thing").as_deref(),
            Some("Thing")
        );
        assert_eq!(
            world.resolve_library(&root, "widgets.drag").as_deref(),
            Some("GlobalDrag")
        );
        assert_eq!(world.resolve_library(&child, "drag"), None);
    }

    #[test]
    fn mutations_on_destroyed_entities_are_ignored() {
        let mut world = world();
        let id = world.create(ELEMENT).unwrap();
        world.remove(&id).unwrap();
        world.changed_elements(false);

        world.set_style(&id, "color", "red");
        assert!(!world.contains(&id));
        assert!(world.changed_elements(false).is_empty());
    }
}
