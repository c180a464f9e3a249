//! Modern framework surface: hierarchical injector, component descriptors
//! and instances, event emitters, and the per-component change detector.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::binding::Changes;
use crate::dom::NodeHandle;
use crate::legacy::EditableValue;
use crate::value::Value;

/// Token under which a component's enclosing legacy scope is provided.
pub const SCOPE_TOKEN: &str = "$scope";

// ═══════════════════════════════════════════════════════════════════════════
// INJECTOR
// ═══════════════════════════════════════════════════════════════════════════

/// String-token provider map with parent-chain lookup.
pub struct Injector {
    providers: RefCell<HashMap<String, Rc<dyn Any>>>,
    parent: Option<Rc<Injector>>,
}

impl Injector {
    pub fn new() -> Rc<Injector> {
        Rc::new(Injector {
            providers: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(self: &Rc<Self>) -> Rc<Injector> {
        Rc::new(Injector {
            providers: RefCell::new(HashMap::new()),
            parent: Some(self.clone()),
        })
    }

    pub fn provide(&self, token: &str, provider: Rc<dyn Any>) {
        self.providers
            .borrow_mut()
            .insert(token.to_string(), provider);
    }

    pub fn get(&self, token: &str) -> Option<Rc<dyn Any>> {
        if let Some(provider) = self.providers.borrow().get(token) {
            return Some(provider.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(token))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPONENT DESCRIPTORS AND INSTANCES
// ═══════════════════════════════════════════════════════════════════════════

/// Static metadata for one component made available to the legacy side.
/// Input and output entries use the `"prop: attr"` spec form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub component_name: String,
    pub selector: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Content-projection selectors, in declaration order. Empty means a
    /// single wildcard slot.
    #[serde(default)]
    pub content_selectors: Vec<String>,
}

/// Multicast callback list for one declared output.
#[derive(Clone)]
pub struct EventEmitter {
    subscribers: Rc<RefCell<Vec<Rc<dyn Fn(Value)>>>>,
}

impl EventEmitter {
    pub fn new() -> EventEmitter {
        EventEmitter {
            subscribers: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(Value) + 'static) {
        self.subscribers.borrow_mut().push(Rc::new(callback));
    }

    pub fn emit(&self, value: Value) {
        let subscribers: Vec<Rc<dyn Fn(Value)>> = self.subscribers.borrow().clone();
        for subscriber in subscribers {
            subscriber(value.clone());
        }
    }
}

type ChangesHook = Box<dyn Fn(&Changes)>;

/// A live component created by a factory. Inputs are plain value slots; the
/// adapter drives them and calls the changes hook itself.
pub struct ComponentInstance {
    name: String,
    inputs: RefCell<HashMap<String, Value>>,
    outputs: HashMap<String, EventEmitter>,
    on_changes: Option<ChangesHook>,
    editable: Option<Rc<dyn EditableValue>>,
}

pub struct ComponentInstanceBuilder {
    name: String,
    outputs: HashMap<String, EventEmitter>,
    on_changes: Option<ChangesHook>,
    editable: Option<Rc<dyn EditableValue>>,
}

impl ComponentInstanceBuilder {
    pub fn new(name: &str) -> ComponentInstanceBuilder {
        ComponentInstanceBuilder {
            name: name.to_string(),
            outputs: HashMap::new(),
            on_changes: None,
            editable: None,
        }
    }

    pub fn output(mut self, name: &str) -> Self {
        self.outputs.insert(name.to_string(), EventEmitter::new());
        self
    }

    pub fn on_changes(mut self, hook: impl Fn(&Changes) + 'static) -> Self {
        self.on_changes = Some(Box::new(hook));
        self
    }

    pub fn editable(mut self, editable: Rc<dyn EditableValue>) -> Self {
        self.editable = Some(editable);
        self
    }

    pub fn build(self) -> Rc<ComponentInstance> {
        Rc::new(ComponentInstance {
            name: self.name,
            inputs: RefCell::new(HashMap::new()),
            outputs: self.outputs,
            on_changes: self.on_changes,
            editable: self.editable,
        })
    }
}

impl ComponentInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_input(&self, name: &str, value: Value) {
        self.inputs.borrow_mut().insert(name.to_string(), value);
    }

    pub fn get_input(&self, name: &str) -> Option<Value> {
        self.inputs.borrow().get(name).cloned()
    }

    pub fn get_output(&self, name: &str) -> Option<EventEmitter> {
        self.outputs.get(name).cloned()
    }

    pub fn has_changes_hook(&self) -> bool {
        self.on_changes.is_some()
    }

    pub fn call_on_changes(&self, changes: &Changes) {
        if let Some(hook) = &self.on_changes {
            hook(changes);
        }
    }

    pub fn editable(&self) -> Option<Rc<dyn EditableValue>> {
        self.editable.clone()
    }
}

/// Builds one component instance from its injector and the already-grouped
/// projected content.
pub type ComponentFactory =
    Rc<dyn Fn(&Rc<Injector>, &[Vec<NodeHandle>]) -> Rc<ComponentInstance>>;

// ═══════════════════════════════════════════════════════════════════════════
// CHANGE DETECTION
// ═══════════════════════════════════════════════════════════════════════════

struct DetectorState {
    marked: Cell<bool>,
    detect_runs: Cell<u64>,
}

/// Per-component detector handle. `mark_for_check` defers to the host's next
/// turn; `detect_changes` runs a check immediately.
#[derive(Clone)]
pub struct ChangeDetector(Rc<DetectorState>);

impl ChangeDetector {
    pub fn new() -> ChangeDetector {
        ChangeDetector(Rc::new(DetectorState {
            marked: Cell::new(false),
            detect_runs: Cell::new(0),
        }))
    }

    pub fn mark_for_check(&self) {
        self.0.marked.set(true);
    }

    pub fn detect_changes(&self) {
        self.0.detect_runs.set(self.0.detect_runs.get() + 1);
        self.0.marked.set(false);
    }

    pub fn is_marked(&self) -> bool {
        self.0.marked.get()
    }

    pub fn runs(&self) -> u64 {
        self.0.detect_runs.get()
    }
}

/// Hook for host-page tooling that tracks which elements own a component.
pub trait DiagnosticsRegistry {
    fn register(&self, element: &NodeHandle, component_name: &str);
    fn unregister(&self, element: &NodeHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injector_walks_parent_chain() {
        let root = Injector::new();
        root.provide("config", Rc::new(7u32) as Rc<dyn Any>);
        let child = root.child();
        child.provide("local", Rc::new(1u32) as Rc<dyn Any>);

        let found = child.get("config").and_then(|p| p.downcast::<u32>().ok());
        assert_eq!(found.as_deref(), Some(&7));
        assert!(root.get("local").is_none());
        assert!(child.get("absent").is_none());
    }

    #[test]
    fn test_child_provider_shadows_parent() {
        let root = Injector::new();
        root.provide("t", Rc::new(1u32) as Rc<dyn Any>);
        let child = root.child();
        child.provide("t", Rc::new(2u32) as Rc<dyn Any>);
        let found = child.get("t").and_then(|p| p.downcast::<u32>().ok());
        assert_eq!(found.as_deref(), Some(&2));
    }

    #[test]
    fn test_emitter_multicasts_in_order() {
        let emitter = EventEmitter::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..2 {
            let sink = log.clone();
            emitter.subscribe(move |value| sink.borrow_mut().push((i, value)));
        }
        emitter.emit(Value::from(5i64));
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(log.borrow()[0].0, 0);
    }

    #[test]
    fn test_detector_mark_and_detect() {
        let detector = ChangeDetector::new();
        assert!(!detector.is_marked());
        detector.mark_for_check();
        assert!(detector.is_marked());
        detector.detect_changes();
        assert!(!detector.is_marked());
        assert_eq!(detector.runs(), 1);
    }

    #[test]
    fn test_descriptor_round_trips_camel_case() {
        let json = r#"{
            "componentName": "HeroDetail",
            "selector": "hero-detail",
            "inputs": ["hero"],
            "outputs": ["deleted: heroDeleted"]
        }"#;
        let descriptor: ComponentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.component_name, "HeroDetail");
        assert!(descriptor.content_selectors.is_empty());
    }
}
