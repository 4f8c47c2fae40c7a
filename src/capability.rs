//! Capabilities: named tables of operations attached to entities by name.

use crate::entity::BehaviorSource;
use crate::error::DispatchError;
use crate::view_tree::ViewFacade;
use crate::world::ModelFacade;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The result of an operation.
pub type OpResult = Result<Value, DispatchError>;

/// A model-side operation.
pub type ModelOp = fn(&mut ModelFacade<'_>, &[Value]) -> OpResult;

/// A view-side operation.
pub type ViewOp = fn(&mut ViewFacade<'_>, &[Value]) -> OpResult;

/// Name of the operation invoked once when a capability is attached.
pub const INIT: &str = "init";

/// A named table of operations.
pub struct Capability<Op> {
    name: String,
    ops: HashMap<String, Op>,
}

pub type ModelCapability = Capability<ModelOp>;
pub type ViewCapability = Capability<ViewOp>;

impl<Op: Copy> Capability<Op> {
    pub fn new(name: &str) -> Self {
        Capability {
            name: name.to_string(),
            ops: HashMap::new(),
        }
    }

    /// Adds an operation.
    pub fn with_op(mut self, name: &str, op: Op) -> Self {
        self.ops.insert(name.to_string(), op);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self, name: &str) -> Option<Op> {
        self.ops.get(name).copied()
    }

    pub fn has_init(&self) -> bool {
        self.ops.contains_key(INIT)
    }
}

impl<Op> fmt::Debug for Capability<Op> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut ops: Vec<_> = self.ops.keys().collect();
        ops.sort();
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("ops", &ops)
            .finish()
    }
}

/// Capabilities available to a session, populated at startup.
pub struct CapabilityRegistry<Op> {
    capabilities: HashMap<String, Arc<Capability<Op>>>,
}

impl<Op> Default for CapabilityRegistry<Op> {
    fn default() -> Self {
        CapabilityRegistry {
            capabilities: HashMap::new(),
        }
    }
}

impl<Op: Copy> CapabilityRegistry<Op> {
    pub fn new() -> Self {
        CapabilityRegistry::default()
    }

    pub fn register(&mut self, capability: Capability<Op>) {
        let name = capability.name.clone();
        if self
            .capabilities
            .insert(name.clone(), Arc::new(capability))
            .is_some()
        {
            tracing::warn!(capability = %name, "replacing registered capability");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Capability<Op>>> {
        self.capabilities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }
}

/// A behavior list resolved against a registry. Built once per distinct list.
pub struct Resolved<Op> {
    sources: Vec<BehaviorSource>,
    capabilities: Vec<Arc<Capability<Op>>>,
}

impl<Op> Default for Resolved<Op> {
    fn default() -> Self {
        Resolved {
            sources: Vec::new(),
            capabilities: Vec::new(),
        }
    }
}

impl<Op: Copy> Resolved<Op> {
    /// Resolves `sources`, turning library paths into names with `lookup`. Unresolvable
    /// entries are logged and skipped. A later capability with the same name replaces an earlier
    /// one in place.
    pub fn resolve(
        sources: &[BehaviorSource],
        registry: &CapabilityRegistry<Op>,
        mut lookup: impl FnMut(&str) -> Option<String>,
    ) -> Self {
        let mut capabilities: Vec<Arc<Capability<Op>>> = Vec::new();
        for source in sources {
            let name = match source {
                BehaviorSource::Capability(name) => name.clone(),
                BehaviorSource::Library(path) => match lookup(path) {
                    Some(name) => name,
                    None => {
                        tracing::warn!(path = %path, "behavior not found in any library");
                        continue;
                    }
                },
            };
            let capability = match registry.get(&name) {
                Some(capability) => capability.clone(),
                None => {
                    tracing::warn!(capability = %name, "capability not registered");
                    continue;
                }
            };
            match capabilities.iter_mut().find(|c| c.name == name) {
                Some(slot) => *slot = capability,
                None => capabilities.push(capability),
            }
        }
        Resolved {
            sources: sources.to_vec(),
            capabilities,
        }
    }

    pub fn sources(&self) -> &[BehaviorSource] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Capability<Op>>> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    pub fn capabilities(&self) -> &[Arc<Capability<Op>>] {
        &self.capabilities
    }

    /// Names of the installed capabilities that have an `init` operation, in order.
    pub fn initializers(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|c| c.has_init())
            .map(|c| c.name.clone())
            .collect()
    }
}

impl<Op> fmt::Debug for Resolved<Op> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.capabilities.iter().map(|c| &c.name))
            .finish()
    }
}

/// Reads argument `index` as a string.
pub fn arg_str(args: &[Value], index: usize) -> Result<&str, DispatchError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or(DispatchError::BadArgument {
            index,
            expected: "string",
        })
}

/// Reads argument `index` as a number.
pub fn arg_f64(args: &[Value], index: usize) -> Result<f64, DispatchError> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or(DispatchError::BadArgument {
            index,
            expected: "number",
        })
}

static NULL: Value = Value::Null;

/// Reads argument `index`, or null if missing.
pub fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestOp = fn(i32) -> i32;

    fn double(x: i32) -> i32 {
        x * 2
    }

    fn negate(x: i32) -> i32 {
        -x
    }

    fn registry() -> CapabilityRegistry<TestOp> {
        let mut registry = CapabilityRegistry::new();
        registry.register(Capability::new("A").with_op("run", double as TestOp));
        registry.register(
            Capability::new("B")
                .with_op("run", negate as TestOp)
                .with_op(INIT, double as TestOp),
        );
        registry
    }

    #[test]
    fn resolve_by_name_and_path() {
        let registry = registry();
        let sources = vec![
            BehaviorSource::from("A"),
            BehaviorSource::from("lib.b"),
            BehaviorSource::from("Missing"),
        ];
        let resolved = Resolved::resolve(&sources, &registry, |path| {
            (path == "lib.b").then(|| "B".to_string())
        });

        assert_eq!(resolved.capabilities().len(), 2);
        assert_eq!(resolved.get("A").and_then(|c| c.op("run")).map(|f| f(3)), Some(6));
        assert_eq!(resolved.get("B").and_then(|c| c.op("run")).map(|f| f(3)), Some(-3));
        assert_eq!(resolved.initializers(), vec!["B".to_string()]);
        assert_eq!(resolved.sources(), &sources[..]);
    }

    #[test]
    fn same_name_replaces_in_place() {
        let registry = registry();
        let resolved = Resolved::resolve(
            &[BehaviorSource::from("A"), BehaviorSource::from("B"), BehaviorSource::from("A")],
            &registry,
            |_| None,
        );
        let names: Vec<_> = resolved.capabilities().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn argument_helpers() {
        let args = vec![Value::from("x"), Value::from(2.5)];
        assert_eq!(arg_str(&args, 0), Ok("x"));
        assert_eq!(arg_f64(&args, 1), Ok(2.5));
        assert!(arg_str(&args, 1).is_err());
        assert_eq!(arg(&args, 5), &Value::Null);
    }
}
