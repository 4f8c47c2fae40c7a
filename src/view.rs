//! Per-entity reconciliation.

use crate::asset::{AssetRef, ResolvedAsset};
use crate::capability::{Resolved, ViewOp};
use crate::entity::{BehaviorSource, Entity, EntityId, EventBinding};
use crate::error::AssetError;
use crate::patch::{NodeId, Patch};
use crate::style::{self, Style, StyleValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Surface property the resolved background asset is shown through.
const BACKGROUND_IMAGE: &str = "background-image";

/// Properties handled by the direct-manipulation path instead of the generic loop.
const DIMENSIONS: [&str; 2] = ["width", "height"];

/// An asset fetch the view tree has to start.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssetRequest {
    pub(crate) asset: AssetRef,
    pub(crate) generation: u64,
}

#[derive(Debug, Default)]
struct AssetSlot {
    generation: u64,
    requested: Option<AssetRef>,
    current: Option<ResolvedAsset>,
}

/// Keeps the surface node of one entity in sync with the entity.
///
/// Holds the values it last applied; every diff step compares against those and only emits
/// patches for what changed.
pub struct Reconciler {
    entity: EntityId,
    node: NodeId,
    dom_id: Option<String>,
    classes: Vec<String>,
    content: Option<String>,
    style: BTreeMap<String, String>,
    transform: Option<[f64; 6]>,
    transform_origin: Option<String>,
    class_block: Option<String>,
    listeners: BTreeMap<String, EventBinding>,
    behaviors: Option<Vec<BehaviorSource>>,
    resolved: Arc<Resolved<ViewOp>>,
    asset: AssetSlot,
    state: Map<String, Value>,
    applied: u64,
}

impl Reconciler {
    pub(crate) fn new(entity: EntityId, node: NodeId) -> Reconciler {
        Reconciler {
            entity,
            node,
            dom_id: None,
            classes: Vec::new(),
            content: None,
            style: BTreeMap::new(),
            transform: None,
            transform_origin: None,
            class_block: None,
            listeners: BTreeMap::new(),
            behaviors: None,
            resolved: Arc::new(Resolved::default()),
            asset: AssetSlot::default(),
            state: Map::new(),
            applied: 0,
        }
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// How many times this reconciler has been applied.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// The surface listener bound for an event type.
    pub fn listener(&self, event: &str) -> Option<&EventBinding> {
        self.listeners.get(event)
    }

    pub fn resolved(&self) -> &Arc<Resolved<ViewOp>> {
        &self.resolved
    }

    /// View-local state. Never replicated.
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    /// Style block id for the entity's class rules.
    pub fn style_block_id(&self) -> String {
        format!("style{}", self.entity.short())
    }

    /// Diffs everything except the child list. Returns an asset fetch to start, if the
    /// background asset changed.
    pub(crate) fn apply(&mut self, entity: &Entity, out: &mut Vec<Patch>) -> Option<AssetRequest> {
        self.applied += 1;

        if self.dom_id.as_deref() != entity.dom_id() {
            self.dom_id = entity.dom_id().map(str::to_string);
            out.push(Patch::SetDomId(self.node, self.dom_id.clone()));
        }

        if self.classes != entity.class_list() {
            self.classes = entity.class_list().to_vec();
            out.push(Patch::SetClasses(self.node, self.classes.clone()));
        }

        // absent content leaves whatever is there
        if let Some(content) = entity.content() {
            if self.content.as_deref() != Some(content) {
                self.content = Some(content.to_string());
                out.push(Patch::SetContent(self.node, self.content.clone()));
            }
        }

        self.diff_listeners(entity, out);
        self.diff_style(entity.style(), out);
        let request = self.diff_asset(entity.style(), out);
        self.diff_class_block(entity.style(), out);
        request
    }

    fn diff_listeners(&mut self, entity: &Entity, out: &mut Vec<Patch>) {
        let mut stale = self.listeners.clone();
        for (event, binding) in entity.event_bindings() {
            match stale.remove(event) {
                Some(old) if old == *binding => continue,
                Some(old) => out.push(Patch::RemoveListener {
                    node: self.node,
                    event: event.clone(),
                    capture: old.capture,
                }),
                None => (),
            }
            out.push(Patch::AddListener {
                node: self.node,
                event: event.clone(),
                capture: binding.capture,
            });
            self.listeners.insert(event.clone(), binding.clone());
        }
        for (event, old) in stale {
            self.listeners.remove(&event);
            out.push(Patch::RemoveListener {
                node: self.node,
                event,
                capture: old.capture,
            });
        }
    }

    fn diff_style(&mut self, style: &Style, out: &mut Vec<Patch>) {
        let direct = style.is_direct_manipulation();
        let mut next = BTreeMap::new();

        if direct {
            let transform = style.transform_components();
            if self.transform != Some(transform) {
                self.transform = Some(transform);
                let [a, b, c, d, e, f] = transform;
                out.push(Patch::SetStyle(
                    self.node,
                    "transform".to_string(),
                    format!("matrix({}, {}, {}, {}, {}, {})", a, b, c, d, e, f),
                ));
            }
            let origin = style.transform_origin();
            if self.transform_origin.as_ref() != Some(&origin) {
                out.push(Patch::SetStyle(
                    self.node,
                    "transform-origin".to_string(),
                    origin.clone(),
                ));
                self.transform_origin = Some(origin);
            }
            for name in DIMENSIONS {
                if let Some(value) = style.property(name) {
                    next.insert(name.to_string(), dimension(value));
                }
            }
        } else {
            if self.transform.take().is_some() {
                out.push(Patch::RemoveStyle(self.node, "transform".to_string()));
            }
            if self.transform_origin.take().is_some() {
                out.push(Patch::RemoveStyle(self.node, "transform-origin".to_string()));
            }
        }

        for (name, value) in style.properties() {
            if name.starts_with(style::PREFIX) || (direct && DIMENSIONS.contains(&name)) {
                continue;
            }
            next.insert(name.to_string(), surface_text(value));
        }

        for (name, value) in &next {
            if self.style.get(name) != Some(value) {
                out.push(Patch::SetStyle(self.node, name.clone(), value.clone()));
            }
        }
        for name in self.style.keys() {
            if !next.contains_key(name) {
                out.push(Patch::RemoveStyle(self.node, name.clone()));
            }
        }
        self.style = next;
    }

    fn diff_asset(&mut self, style: &Style, out: &mut Vec<Patch>) -> Option<AssetRequest> {
        let asset = style.background_asset();
        if self.asset.requested.as_ref() == asset {
            return None;
        }
        self.asset.generation += 1;
        self.asset.requested = asset.cloned();
        match asset {
            Some(asset) => Some(AssetRequest {
                asset: asset.clone(),
                generation: self.asset.generation,
            }),
            None => {
                if self.asset.current.is_some() {
                    out.push(Patch::RemoveStyle(self.node, BACKGROUND_IMAGE.to_string()));
                }
                None
            }
        }
    }

    /// The resolved asset that is no longer shown after the background asset was removed.
    pub(crate) fn take_unused_asset(&mut self) -> Option<ResolvedAsset> {
        if self.asset.requested.is_none() {
            self.asset.current.take()
        } else {
            None
        }
    }

    /// Accepts a fetch completion. Completions for anything but the latest request are dropped.
    /// Returns the previously shown asset, which the caller releases.
    pub(crate) fn complete_asset(
        &mut self,
        generation: u64,
        result: Result<ResolvedAsset, AssetError>,
        out: &mut Vec<Patch>,
    ) -> Option<ResolvedAsset> {
        if generation != self.asset.generation || self.asset.requested.is_none() {
            tracing::debug!(
                entity = %self.entity,
                generation,
                latest = self.asset.generation,
                "dropping stale asset completion"
            );
            // a stale success is never shown, so it is released right away
            return result.ok();
        }
        match result {
            Ok(resolved) => {
                out.push(Patch::SetStyle(
                    self.node,
                    BACKGROUND_IMAGE.to_string(),
                    format!("url({})", resolved.url),
                ));
                self.asset.current.replace(resolved)
            }
            Err(err) => {
                tracing::warn!(entity = %self.entity, error = %err, "asset fetch failed");
                None
            }
        }
    }

    fn diff_class_block(&mut self, style: &Style, out: &mut Vec<Patch>) {
        let classes = style.classes();
        if self.class_block.as_deref() == classes {
            return;
        }
        match classes {
            Some(text) => out.push(Patch::InstallStyleBlock {
                id: self.style_block_id(),
                text: text.to_string(),
            }),
            None => out.push(Patch::RemoveStyleBlock(self.style_block_id())),
        }
        self.class_block = classes.map(str::to_string);
    }

    /// Whether the view behavior list differs from the one last resolved.
    pub(crate) fn behaviors_changed(&self, entity: &Entity) -> bool {
        self.behaviors.as_deref() != Some(entity.view_behaviors())
    }

    pub(crate) fn set_resolved(&mut self, sources: Vec<BehaviorSource>, resolved: Resolved<ViewOp>) {
        self.behaviors = Some(sources);
        self.resolved = Arc::new(resolved);
    }

    /// Destroys the node and its auxiliary style block. Returns the shown asset for release.
    pub(crate) fn teardown(mut self, out: &mut Vec<Patch>) -> Option<ResolvedAsset> {
        if self.class_block.is_some() {
            out.push(Patch::RemoveStyleBlock(self.style_block_id()));
        }
        out.push(Patch::Destroy(self.node));
        self.asset.current.take()
    }
}

/// Surface text for a generic property.
fn surface_text(value: &StyleValue) -> String {
    match value {
        StyleValue::Text(text) => text.clone(),
        StyleValue::Json(Value::String(text)) => text.clone(),
        StyleValue::Json(json) => json.to_string(),
        StyleValue::Asset(asset) => asset.to_string(),
    }
}

/// Surface text for a dimension; bare numbers are pixels.
fn dimension(value: &StyleValue) -> String {
    let text = surface_text(value);
    if text.trim().parse::<f64>().is_ok() {
        format!("{}px", text.trim())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetRef;
    use crate::entity::HandlerSpec;
    use pretty_assertions::assert_eq;

    fn fixture() -> (Reconciler, Entity, NodeId) {
        let node = NodeId::new();
        let id = EntityId::from("0002");
        (Reconciler::new(id.clone(), node), Entity::new(id, "Element", 2), node)
    }

    #[test]
    fn only_changed_style_properties_are_patched() {
        let (mut rec, mut entity, node) = fixture();
        entity.style.set_property("width", "10px");
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(out, vec![Patch::SetStyle(node, "width".into(), "10px".into())]);

        entity.style.set_property("color", "red");
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(out, vec![Patch::SetStyle(node, "color".into(), "red".into())]);

        entity.style.remove_property("width");
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(out, vec![Patch::RemoveStyle(node, "width".into())]);
        assert_eq!(rec.applied(), 3);
    }

    #[test]
    fn direct_manipulation_path() {
        let (mut rec, mut entity, node) = fixture();
        entity.style.set_property(style::DIRECT_MANIPULATION, Value::Bool(true));
        entity.style.set_transform([2., 0., 0., 2., 5., 6.]);
        entity.style.set_property("width", "100");
        entity.style.set_property("height", "50%");
        entity.style.set_property("-cards-other", Value::from(1));

        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert!(out.contains(&Patch::SetStyle(
            node,
            "transform".into(),
            "matrix(2, 0, 0, 2, 5, 6)".into()
        )));
        assert!(out.contains(&Patch::SetStyle(node, "width".into(), "100px".into())));
        assert!(out.contains(&Patch::SetStyle(node, "height".into(), "50%".into())));
        assert!(!out.iter().any(|p| matches!(p, Patch::SetStyle(_, name, _) if name.starts_with("-cards-"))));

        // unchanged transform emits nothing
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(out, vec![]);

        entity.style.remove_property(style::DIRECT_MANIPULATION);
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert!(out.contains(&Patch::RemoveStyle(node, "transform".into())));
        // without direct manipulation the dimension goes through the generic loop
        assert!(out.contains(&Patch::SetStyle(node, "width".into(), "100".into())));
    }

    #[test]
    fn listeners_rebind_only_on_change() {
        let (mut rec, mut entity, node) = fixture();
        let binding = |spec: &str, capture| EventBinding {
            spec: HandlerSpec::parse(spec),
            capture,
        };
        entity.event_bindings.insert("click".into(), binding("Button.click", false));
        entity.event_bindings.insert("keydown".into(), binding("Button.key", false));
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(out.len(), 2);

        entity.event_bindings.insert("keydown".into(), binding("Button.key", true));
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(
            out,
            vec![
                Patch::RemoveListener { node, event: "keydown".into(), capture: false },
                Patch::AddListener { node, event: "keydown".into(), capture: true },
            ]
        );

        entity.event_bindings.remove("click");
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(
            out,
            vec![Patch::RemoveListener { node, event: "click".into(), capture: false }]
        );
        assert!(rec.listener("click").is_none());
    }

    #[test]
    fn stale_asset_completions_are_dropped() {
        let (mut rec, mut entity, node) = fixture();
        entity.style.set_property(style::BACKGROUND_IMAGE_ASSET, AssetRef::new("a", "png"));
        let first = rec.apply(&entity, &mut Vec::new()).unwrap();
        entity.style.set_property(style::BACKGROUND_IMAGE_ASSET, AssetRef::new("b", "png"));
        let second = rec.apply(&entity, &mut Vec::new()).unwrap();
        assert_eq!(second.generation, first.generation + 1);

        let mut out = Vec::new();
        let b = ResolvedAsset { url: "blob:b".into() };
        assert_eq!(rec.complete_asset(second.generation, Ok(b.clone()), &mut out), None);
        assert_eq!(
            out,
            vec![Patch::SetStyle(node, "background-image".into(), "url(blob:b)".into())]
        );

        // the older request finishes late; it must not replace the newer one
        let mut out = Vec::new();
        let a = ResolvedAsset { url: "blob:a".into() };
        assert_eq!(rec.complete_asset(first.generation, Ok(a.clone()), &mut out), Some(a));
        assert_eq!(out, vec![]);

        entity.style.remove_property(style::BACKGROUND_IMAGE_ASSET);
        let mut out = Vec::new();
        assert_eq!(rec.apply(&entity, &mut out), None);
        assert_eq!(out, vec![Patch::RemoveStyle(node, "background-image".into())]);
        assert_eq!(rec.take_unused_asset(), Some(b));
    }

    #[test]
    fn class_block_and_teardown() {
        let (mut rec, mut entity, node) = fixture();
        entity.style.set_classes(Some(".a { color: red }".into()));
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(
            out,
            vec![Patch::InstallStyleBlock {
                id: "style0002".into(),
                text: ".a { color: red }".into()
            }]
        );

        let mut out = Vec::new();
        rec.teardown(&mut out);
        assert_eq!(
            out,
            vec![Patch::RemoveStyleBlock("style0002".into()), Patch::Destroy(node)]
        );
    }

    #[test]
    fn dom_id_classes_and_content() {
        let (mut rec, mut entity, node) = fixture();
        entity.dom_id = Some("main".into());
        entity.class_list = vec!["card".into()];
        entity.content = Some("<b>hi</b>".into());
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert_eq!(
            out,
            vec![
                Patch::SetDomId(node, Some("main".into())),
                Patch::SetClasses(node, vec!["card".into()]),
                Patch::SetContent(node, Some("<b>hi</b>".into())),
            ]
        );
        let mut out = Vec::new();
        rec.apply(&entity, &mut out);
        assert!(out.is_empty());
    }
}
