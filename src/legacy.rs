//! Legacy framework surface: dirty-checked scopes, the dotted expression
//! language, normalized attribute maps, and directive/controller definitions.
//!
//! Scopes form a parent chain. Reads fall through to ancestors, writes are
//! always local. A digest snapshots the watcher list, evaluates every getter,
//! and re-runs until a full pass reports no change, up to a fixed iteration
//! cap. Watcher listeners fire on first evaluation with old == new.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use lazy_static::lazy_static;
use regex::Regex;

use crate::binding::{camelize, Changes};
use crate::dom::NodeHandle;
use crate::error::{BridgeError, ERR_EXPRESSION_SYNTAX};
use crate::value::{loose_identical, Value};

// ═══════════════════════════════════════════════════════════════════════════
// SCOPE
// ═══════════════════════════════════════════════════════════════════════════

const DIGEST_TTL: u32 = 10;

struct Watcher {
    id: u64,
    getter: Box<dyn Fn(&Rc<Scope>) -> Value>,
    listener: Box<dyn Fn(&Value, &Value, &Rc<Scope>)>,
    last: RefCell<Option<Value>>,
}

pub struct Scope {
    properties: RefCell<HashMap<String, Value>>,
    methods: RefCell<HashMap<String, Rc<dyn Fn(&[Value]) -> Value>>>,
    watchers: RefCell<Vec<Rc<Watcher>>>,
    next_watch_id: Cell<u64>,
    parent: RefCell<Weak<Scope>>,
    children: RefCell<Vec<Rc<Scope>>>,
    digesting: Cell<bool>,
    destroyed: Cell<bool>,
    destroy_callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            properties: RefCell::new(HashMap::new()),
            methods: RefCell::new(HashMap::new()),
            watchers: RefCell::new(Vec::new()),
            next_watch_id: Cell::new(1),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            digesting: Cell::new(false),
            destroyed: Cell::new(false),
            destroy_callbacks: RefCell::new(Vec::new()),
        })
    }

    pub fn new_child(self: &Rc<Self>) -> Rc<Scope> {
        let child = Scope::root();
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child.clone());
        child
    }

    pub fn parent(&self) -> Option<Rc<Scope>> {
        self.parent.borrow().upgrade()
    }

    /// Topmost scope in this chain. Digest entry point for `apply`.
    pub fn find_root(self: &Rc<Self>) -> Rc<Scope> {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Local value, falling through the parent chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.properties.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent().and_then(|parent| parent.get(name))
    }

    /// Writes never shadow-copy onto ancestors.
    pub fn set(&self, name: &str, value: Value) {
        self.properties.borrow_mut().insert(name.to_string(), value);
    }

    fn take_local(&self, name: &str) -> Option<Value> {
        self.properties.borrow_mut().remove(name)
    }

    fn has_local(&self, name: &str) -> bool {
        self.properties.borrow().contains_key(name)
    }

    pub fn register_method(&self, name: &str, method: Rc<dyn Fn(&[Value]) -> Value>) {
        self.methods.borrow_mut().insert(name.to_string(), method);
    }

    fn find_method(&self, name: &str) -> Option<Rc<dyn Fn(&[Value]) -> Value>> {
        if let Some(method) = self.methods.borrow().get(name) {
            return Some(method.clone());
        }
        self.parent().and_then(|parent| parent.find_method(name))
    }

    pub fn watch(
        &self,
        getter: impl Fn(&Rc<Scope>) -> Value + 'static,
        listener: impl Fn(&Value, &Value, &Rc<Scope>) + 'static,
    ) -> u64 {
        let id = self.next_watch_id.get();
        self.next_watch_id.set(id + 1);
        self.watchers.borrow_mut().push(Rc::new(Watcher {
            id,
            getter: Box::new(getter),
            listener: Box::new(listener),
            last: RefCell::new(None),
        }));
        id
    }

    pub fn unwatch(&self, id: u64) {
        self.watchers.borrow_mut().retain(|watcher| watcher.id != id);
    }

    /// Number of watchers registered directly on this scope.
    pub fn watch_count(&self) -> usize {
        self.watchers.borrow().len()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.watchers.borrow().iter().any(|watcher| watcher.id == id)
    }

    /// One dirty-check pass over this scope and its descendants.
    fn digest_pass(self: &Rc<Self>) -> bool {
        let mut dirty = false;
        let snapshot: Vec<Rc<Watcher>> = self.watchers.borrow().clone();
        for watcher in snapshot {
            if !self.is_registered(watcher.id) {
                continue;
            }
            let value = (watcher.getter)(self);
            if !self.is_registered(watcher.id) {
                continue;
            }
            let previous = watcher.last.borrow().clone();
            match previous {
                None => {
                    *watcher.last.borrow_mut() = Some(value.clone());
                    (watcher.listener)(&value, &value, self);
                    dirty = true;
                }
                Some(old) => {
                    if !loose_identical(&old, &value) {
                        *watcher.last.borrow_mut() = Some(value.clone());
                        (watcher.listener)(&value, &old, self);
                        dirty = true;
                    }
                }
            }
        }
        let children: Vec<Rc<Scope>> = self.children.borrow().clone();
        for child in children {
            if child.digest_pass() {
                dirty = true;
            }
        }
        dirty
    }

    /// Run dirty-check passes until stable. Reentrant calls are no-ops.
    pub fn digest(self: &Rc<Self>) {
        if self.digesting.get() || self.destroyed.get() {
            return;
        }
        self.digesting.set(true);
        let mut ttl = DIGEST_TTL;
        while self.digest_pass() {
            ttl -= 1;
            if ttl == 0 {
                log::error!("digest did not stabilize after {} iterations", DIGEST_TTL);
                break;
            }
        }
        self.digesting.set(false);
    }

    /// Run `f`, then digest from the root of the chain.
    pub fn apply(self: &Rc<Self>, f: impl FnOnce(&Rc<Scope>)) {
        f(self);
        self.find_root().digest();
    }

    /// Schedule `callback` to run during the next digest, exactly once. Uses
    /// a watcher that unregisters itself from inside its own getter so the
    /// digest settles in the same cycle.
    pub fn defer_one_digest(&self, callback: impl FnOnce() + 'static) {
        let pending: RefCell<Option<Box<dyn FnOnce()>>> =
            RefCell::new(Some(Box::new(callback)));
        let watch_id = Rc::new(Cell::new(0u64));
        let id_handle = watch_id.clone();
        let id = self.watch(
            move |scope| {
                scope.unwatch(id_handle.get());
                if let Some(cb) = pending.borrow_mut().take() {
                    cb();
                }
                Value::Null
            },
            |_, _, _| {},
        );
        watch_id.set(id);
    }

    pub fn on_destroy(&self, callback: impl FnOnce() + 'static) {
        if self.destroyed.get() {
            callback();
            return;
        }
        self.destroy_callbacks.borrow_mut().push(Box::new(callback));
    }

    /// Idempotent. Fires destroy callbacks, detaches from the parent, then
    /// destroys children.
    pub fn destroy(self: &Rc<Self>) {
        if self.destroyed.get() {
            return;
        }
        self.destroyed.set(true);
        let callbacks: Vec<Box<dyn FnOnce()>> =
            self.destroy_callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback();
        }
        if let Some(parent) = self.parent() {
            parent
                .children
                .borrow_mut()
                .retain(|child| !Rc::ptr_eq(child, self));
        }
        *self.parent.borrow_mut() = Weak::new();
        let children: Vec<Rc<Scope>> = self.children.borrow_mut().drain(..).collect();
        for child in children {
            child.destroy();
        }
        self.watchers.borrow_mut().clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref EXPRESSION_RE: Regex = Regex::new(
        r"^\s*([a-zA-Z_$][\w$]*(?:\.[a-zA-Z_$][\w$]*)*)\s*(\(\s*([a-zA-Z_$][\w$]*)?\s*\))?\s*$"
    )
    .unwrap();
}

/// A dotted property path, optionally invoked with at most one named
/// argument: `user.name`, `save()`, `notify($event)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Path(Vec<String>),
    Call { path: Vec<String>, arg: Option<String> },
}

impl Expression {
    pub fn parse(source: &str) -> Result<Expression, BridgeError> {
        let captures = EXPRESSION_RE.captures(source).ok_or_else(|| {
            BridgeError::binding(
                ERR_EXPRESSION_SYNTAX,
                &format!("cannot parse expression '{}'", source),
            )
        })?;
        let path: Vec<String> = captures[1].split('.').map(str::to_string).collect();
        if captures.get(2).is_some() {
            let arg = captures.get(3).map(|m| m.as_str().to_string());
            Ok(Expression::Call { path, arg })
        } else {
            Ok(Expression::Path(path))
        }
    }

    /// Only plain paths can be assignment targets.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expression::Path(_))
    }

    pub fn source(&self) -> String {
        match self {
            Expression::Path(path) => path.join("."),
            Expression::Call { path, arg } => format!(
                "{}({})",
                path.join("."),
                arg.as_deref().unwrap_or("")
            ),
        }
    }

    pub fn eval(&self, scope: &Rc<Scope>) -> Value {
        self.eval_with_locals(scope, &HashMap::new())
    }

    /// Locals shadow scope properties for the first path segment. Missing
    /// segments evaluate to null rather than failing.
    pub fn eval_with_locals(&self, scope: &Rc<Scope>, locals: &HashMap<String, Value>) -> Value {
        match self {
            Expression::Path(path) => eval_path(scope, locals, path),
            Expression::Call { path, arg } => {
                let name = path.join(".");
                match scope.find_method(&name) {
                    Some(method) => {
                        let args: Vec<Value> = match arg {
                            Some(arg_name) => {
                                vec![eval_path(scope, locals, &[arg_name.clone()])]
                            }
                            None => Vec::new(),
                        };
                        method(&args)
                    }
                    None => Value::Null,
                }
            }
        }
    }

    /// Write `value` at this path. The write lands on the scope that already
    /// holds the first segment locally, or on `scope` itself; intermediate
    /// maps are created as needed.
    pub fn assign(&self, scope: &Rc<Scope>, value: Value) -> Result<(), BridgeError> {
        let path = match self {
            Expression::Path(path) => path,
            Expression::Call { .. } => {
                return Err(BridgeError::binding(
                    ERR_EXPRESSION_SYNTAX,
                    &format!("expression '{}' is not assignable", self.source()),
                ));
            }
        };
        let target = owning_scope(scope, &path[0]);
        if path.len() == 1 {
            target.set(&path[0], value);
            return Ok(());
        }
        let mut container = target.take_local(&path[0]).unwrap_or(Value::Null);
        assign_into(&mut container, &path[1..], value);
        target.set(&path[0], container);
        Ok(())
    }
}

fn owning_scope(scope: &Rc<Scope>, name: &str) -> Rc<Scope> {
    let mut current = scope.clone();
    loop {
        if current.has_local(name) {
            return current;
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return scope.clone(),
        }
    }
}

fn eval_path(scope: &Rc<Scope>, locals: &HashMap<String, Value>, path: &[String]) -> Value {
    let mut current = match locals.get(&path[0]) {
        Some(value) => value.clone(),
        None => scope.get(&path[0]).unwrap_or(Value::Null),
    };
    for segment in &path[1..] {
        current = match current {
            Value::Map(map) => map.get(segment).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

fn assign_into(container: &mut Value, path: &[String], value: Value) {
    if !matches!(container, Value::Map(_)) {
        *container = Value::Map(BTreeMap::new());
    }
    if let Value::Map(map) = container {
        if path.len() == 1 {
            map.insert(path[0].clone(), value);
        } else {
            let entry = map.entry(path[0].clone()).or_insert(Value::Null);
            assign_into(entry, &path[1..], value);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════

/// Normalized attribute map for one element. Keys are camelized from the
/// kebab-case DOM names. Observers are one-shot: each fires at most once,
/// at the first flush after registration, with the value present then.
pub struct Attributes {
    values: RefCell<BTreeMap<String, String>>,
    observers: RefCell<Vec<(String, Box<dyn FnOnce(&str)>)>>,
}

impl Attributes {
    pub fn new() -> Attributes {
        Attributes {
            values: RefCell::new(BTreeMap::new()),
            observers: RefCell::new(Vec::new()),
        }
    }

    pub fn from_element(element: &NodeHandle) -> Attributes {
        let attrs = Attributes::new();
        for (name, value) in element.attributes() {
            attrs.values.borrow_mut().insert(camelize(&name), value);
        }
        attrs
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    pub fn observe(&self, key: &str, callback: impl FnOnce(&str) + 'static) {
        self.observers
            .borrow_mut()
            .push((key.to_string(), Box::new(callback)));
    }

    /// Deliver every queued observer its current value. Observers for absent
    /// attributes are dropped without firing.
    pub fn flush_observers(&self) {
        let observers: Vec<(String, Box<dyn FnOnce(&str)>)> =
            self.observers.borrow_mut().drain(..).collect();
        for (key, callback) in observers {
            if let Some(value) = self.get(&key) {
                callback(&value);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTROLLERS
// ═══════════════════════════════════════════════════════════════════════════

/// Capability surface for a bidirectional value editor (form-control style).
pub trait EditableValue {
    fn write_value(&self, value: Value);
    fn register_on_change(&self, callback: Box<dyn Fn(Value)>);
}

/// Which lifecycle hooks a controller implements. Resolved once at build
/// time so every dispatch site branches on a copy of this enum instead of
/// re-probing hook presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookLevel {
    NoHooks,
    InitOnly,
    Full,
}

type InitHook = Box<dyn Fn(&Controller)>;
type ChangesHook = Box<dyn Fn(&Controller, &Changes)>;

struct ControllerState {
    properties: RefCell<HashMap<String, Value>>,
    callbacks: RefCell<HashMap<String, Rc<dyn Fn(&[Value]) -> Value>>>,
    on_init: Option<InitHook>,
    do_check: Option<InitHook>,
    on_changes: Option<ChangesHook>,
    post_link: Option<InitHook>,
    on_destroy: Option<InitHook>,
    hook_level: HookLevel,
    editable: Option<Rc<dyn EditableValue>>,
}

#[derive(Clone)]
pub struct Controller(Rc<ControllerState>);

pub struct ControllerBuilder {
    on_init: Option<InitHook>,
    do_check: Option<InitHook>,
    on_changes: Option<ChangesHook>,
    post_link: Option<InitHook>,
    on_destroy: Option<InitHook>,
    editable: Option<Rc<dyn EditableValue>>,
}

impl ControllerBuilder {
    pub fn new() -> ControllerBuilder {
        ControllerBuilder {
            on_init: None,
            do_check: None,
            on_changes: None,
            post_link: None,
            on_destroy: None,
            editable: None,
        }
    }

    pub fn on_init(mut self, hook: impl Fn(&Controller) + 'static) -> Self {
        self.on_init = Some(Box::new(hook));
        self
    }

    pub fn do_check(mut self, hook: impl Fn(&Controller) + 'static) -> Self {
        self.do_check = Some(Box::new(hook));
        self
    }

    pub fn on_changes(mut self, hook: impl Fn(&Controller, &Changes) + 'static) -> Self {
        self.on_changes = Some(Box::new(hook));
        self
    }

    pub fn post_link(mut self, hook: impl Fn(&Controller) + 'static) -> Self {
        self.post_link = Some(Box::new(hook));
        self
    }

    pub fn on_destroy(mut self, hook: impl Fn(&Controller) + 'static) -> Self {
        self.on_destroy = Some(Box::new(hook));
        self
    }

    pub fn editable(mut self, editable: Rc<dyn EditableValue>) -> Self {
        self.editable = Some(editable);
        self
    }

    pub fn build(self) -> Controller {
        let has_extended = self.do_check.is_some()
            || self.on_changes.is_some()
            || self.post_link.is_some()
            || self.on_destroy.is_some();
        let hook_level = if has_extended {
            HookLevel::Full
        } else if self.on_init.is_some() {
            HookLevel::InitOnly
        } else {
            HookLevel::NoHooks
        };
        Controller(Rc::new(ControllerState {
            properties: RefCell::new(HashMap::new()),
            callbacks: RefCell::new(HashMap::new()),
            on_init: self.on_init,
            do_check: self.do_check,
            on_changes: self.on_changes,
            post_link: self.post_link,
            on_destroy: self.on_destroy,
            hook_level,
            editable: self.editable,
        }))
    }
}

impl Controller {
    pub fn hook_level(&self) -> HookLevel {
        self.0.hook_level
    }

    pub fn get_property(&self, name: &str) -> Option<Value> {
        self.0.properties.borrow().get(name).cloned()
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.0
            .properties
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    pub fn set_callback(&self, name: &str, callback: Rc<dyn Fn(&[Value]) -> Value>) {
        self.0
            .callbacks
            .borrow_mut()
            .insert(name.to_string(), callback);
    }

    pub fn invoke_callback(&self, name: &str, args: &[Value]) -> Value {
        let callback = self.0.callbacks.borrow().get(name).cloned();
        match callback {
            Some(callback) => callback(args),
            None => Value::Null,
        }
    }

    pub fn editable(&self) -> Option<Rc<dyn EditableValue>> {
        self.0.editable.clone()
    }

    pub fn call_on_init(&self) {
        if self.0.hook_level == HookLevel::NoHooks {
            return;
        }
        if let Some(hook) = &self.0.on_init {
            hook(self);
        }
    }

    pub fn call_do_check(&self) {
        if self.0.hook_level != HookLevel::Full {
            return;
        }
        if let Some(hook) = &self.0.do_check {
            hook(self);
        }
    }

    pub fn call_on_changes(&self, changes: &Changes) {
        if self.0.hook_level != HookLevel::Full {
            return;
        }
        if let Some(hook) = &self.0.on_changes {
            hook(self, changes);
        }
    }

    pub fn call_post_link(&self) {
        if self.0.hook_level != HookLevel::Full {
            return;
        }
        if let Some(hook) = &self.0.post_link {
            hook(self);
        }
    }

    pub fn call_on_destroy(&self) {
        if self.0.hook_level != HookLevel::Full {
            return;
        }
        if let Some(hook) = &self.0.on_destroy {
            hook(self);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DIRECTIVE DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════

pub type ControllerFactory = Rc<dyn Fn(&Rc<Scope>, &NodeHandle, &Attributes) -> Controller>;
pub type LinkFn = Rc<dyn Fn(&Rc<Scope>, &NodeHandle, &Attributes, Option<&Controller>, Option<&TranscludeFn>)>;

/// Hands back the projected nodes for a named slot, or the default group.
pub type TranscludeFn = Rc<dyn Fn(Option<&str>) -> Vec<NodeHandle>>;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    Inline(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscludeSpec {
    /// Single-slot: all content projected as one group.
    Content,
    /// Named slots: slot name -> element tag selector, where a `?` prefix
    /// on the selector marks the slot optional.
    Slots(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequireSpec {
    Single(String),
    Multiple(Vec<String>),
    Map(BTreeMap<String, String>),
}

pub enum LinkSpec {
    /// A bare link function runs in the post-link phase.
    Fn(LinkFn),
    PrePost {
        pre: Option<LinkFn>,
        post: Option<LinkFn>,
    },
}

pub struct DirectiveDefinition {
    pub name: String,
    /// `property: definition` binding map for an isolate scope.
    pub scope_bindings: Option<BTreeMap<String, String>>,
    /// Binding map applied to the controller instead of the scope.
    pub bind_to_controller: Option<BTreeMap<String, String>>,
    pub controller: Option<ControllerFactory>,
    pub require: Option<RequireSpec>,
    pub transclude: Option<TranscludeSpec>,
    pub template: Option<TemplateSource>,
    pub link: Option<LinkSpec>,
    pub replace: bool,
    pub terminal: bool,
    pub has_compile: bool,
}

impl DirectiveDefinition {
    pub fn new(name: &str) -> DirectiveDefinition {
        DirectiveDefinition {
            name: name.to_string(),
            scope_bindings: None,
            bind_to_controller: None,
            controller: None,
            require: None,
            transclude: None,
            template: None,
            link: None,
            replace: false,
            terminal: false,
            has_compile: false,
        }
    }

    /// The binding map that feeds the controller when `bindToController`
    /// is in play, otherwise the isolate-scope map.
    pub fn binding_map(&self) -> Option<&BTreeMap<String, String>> {
        self.bind_to_controller
            .as_ref()
            .or(self.scope_bindings.as_ref())
    }

    pub fn binds_to_controller(&self) -> bool {
        self.bind_to_controller.is_some()
    }
}

pub struct DirectiveRegistry {
    directives: RefCell<HashMap<String, Vec<Rc<DirectiveDefinition>>>>,
}

impl DirectiveRegistry {
    pub fn new() -> DirectiveRegistry {
        DirectiveRegistry {
            directives: RefCell::new(HashMap::new()),
        }
    }

    pub fn register(&self, definition: DirectiveDefinition) {
        self.directives
            .borrow_mut()
            .entry(definition.name.clone())
            .or_default()
            .push(Rc::new(definition));
    }

    /// At most one definition may exist under `name`. Absence is fine; the
    /// caller may be about to register the name itself.
    pub fn ensure_unique(&self, name: &str) -> Result<(), BridgeError> {
        let directives = self.directives.borrow();
        match directives.get(name).map(Vec::len).unwrap_or(0) {
            0 | 1 => Ok(()),
            count => Err(BridgeError::unsupported(
                crate::error::ERR_DIRECTIVE_MULTIPLE,
                &format!(
                    "expected at most one directive named '{}', found {}",
                    name, count
                ),
            )),
        }
    }

    /// Exactly one definition must exist under `name`.
    pub fn get_single(&self, name: &str) -> Result<Rc<DirectiveDefinition>, BridgeError> {
        let directives = self.directives.borrow();
        match directives.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(BridgeError::missing(
                crate::error::ERR_DIRECTIVE_MISSING,
                &format!("directive '{}' is not registered", name),
            )),
            Some([single]) => Ok(single.clone()),
            Some(multiple) => Err(BridgeError::unsupported(
                crate::error::ERR_DIRECTIVE_MULTIPLE,
                &format!(
                    "expected exactly one directive named '{}', found {}",
                    name,
                    multiple.len()
                ),
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TEMPLATE COMPILATION
// ═══════════════════════════════════════════════════════════════════════════

/// Seam for the legacy compiler. The bridge hands it detached nodes and a
/// scope; it returns the linked nodes ready for insertion.
pub trait TemplateCompiler {
    fn compile_nodes(&self, scope: &Rc<Scope>, nodes: Vec<NodeHandle>) -> Vec<NodeHandle>;
}

/// Links nothing; returns the nodes untouched. Useful standalone and in
/// tests where no legacy directives apply inside projected content.
pub struct PassthroughCompiler;

impl TemplateCompiler for PassthroughCompiler {
    fn compile_nodes(&self, _scope: &Rc<Scope>, nodes: Vec<NodeHandle>) -> Vec<NodeHandle> {
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::BridgeNode;

    #[test]
    fn test_scope_reads_fall_through_writes_stay_local() {
        let root = Scope::root();
        let child = root.new_child();
        root.set("name", Value::from("parent"));
        assert_eq!(child.get("name"), Some(Value::from("parent")));

        child.set("name", Value::from("child"));
        assert_eq!(child.get("name"), Some(Value::from("child")));
        assert_eq!(root.get("name"), Some(Value::from("parent")));
    }

    #[test]
    fn test_watch_fires_first_run_with_equal_old_and_new() {
        let scope = Scope::root();
        scope.set("count", Value::from(1i64));
        let log: Rc<RefCell<Vec<(Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        scope.watch(
            |s| s.get("count").unwrap_or(Value::Null),
            move |new, old, _| sink.borrow_mut().push((new.clone(), old.clone())),
        );
        scope.digest();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].0, log.borrow()[0].1);
    }

    #[test]
    fn test_digest_reruns_until_stable() {
        let scope = Scope::root();
        scope.set("a", Value::from(1i64));
        scope.set("b", Value::Null);
        // b follows a, so the first pass dirties b and a second pass settles.
        scope.watch(
            |s| s.get("a").unwrap_or(Value::Null),
            |new, _, s| s.set("b", new.clone()),
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        scope.watch(
            |s| s.get("b").unwrap_or(Value::Null),
            move |new, _, _| sink.borrow_mut().push(new.clone()),
        );
        scope.digest();
        assert_eq!(log.borrow().last(), Some(&Value::from(1i64)));
    }

    #[test]
    fn test_unwatch_stops_delivery() {
        let scope = Scope::root();
        scope.set("x", Value::from(1i64));
        let count = Rc::new(Cell::new(0u32));
        let c = count.clone();
        let id = scope.watch(
            |s| s.get("x").unwrap_or(Value::Null),
            move |_, _, _| c.set(c.get() + 1),
        );
        scope.digest();
        assert_eq!(count.get(), 1);
        scope.unwatch(id);
        scope.set("x", Value::from(2i64));
        scope.digest();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_defer_one_digest_runs_exactly_once() {
        let scope = Scope::root();
        let count = Rc::new(Cell::new(0u32));
        let c = count.clone();
        scope.defer_one_digest(move || c.set(c.get() + 1));
        scope.digest();
        scope.digest();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent_and_fires_callbacks_once() {
        let root = Scope::root();
        let child = root.new_child();
        let count = Rc::new(Cell::new(0u32));
        let c = count.clone();
        child.on_destroy(move || c.set(c.get() + 1));
        child.destroy();
        child.destroy();
        assert_eq!(count.get(), 1);
        assert!(root.children.borrow().is_empty());
    }

    #[test]
    fn test_expression_parse_forms() {
        assert_eq!(
            Expression::parse("user.name").ok(),
            Some(Expression::Path(vec!["user".into(), "name".into()]))
        );
        assert_eq!(
            Expression::parse("notify($event)").ok(),
            Some(Expression::Call {
                path: vec!["notify".into()],
                arg: Some("$event".into())
            })
        );
        assert!(Expression::parse("a + b").is_err());
        assert!(Expression::parse("").is_err());
    }

    #[test]
    fn test_expression_eval_and_assign_nested() {
        let scope = Scope::root();
        let expr = Expression::parse("user.address.city").unwrap();
        assert!(expr.is_assignable());
        expr.assign(&scope, Value::from("lyon")).unwrap();
        assert_eq!(expr.eval(&scope), Value::from("lyon"));

        let call = Expression::parse("go()").unwrap();
        assert!(!call.is_assignable());
        assert!(call.assign(&scope, Value::Null).is_err());
    }

    #[test]
    fn test_expression_call_with_event_local() {
        let scope = Scope::root();
        let seen = Rc::new(RefCell::new(Value::Null));
        let sink = seen.clone();
        scope.register_method(
            "notify",
            Rc::new(move |args: &[Value]| {
                *sink.borrow_mut() = args.first().cloned().unwrap_or(Value::Null);
                Value::Null
            }),
        );
        let expr = Expression::parse("notify($event)").unwrap();
        let mut locals = HashMap::new();
        locals.insert("$event".to_string(), Value::from(9i64));
        expr.eval_with_locals(&scope, &locals);
        assert_eq!(*seen.borrow(), Value::from(9i64));
    }

    #[test]
    fn test_attributes_normalize_and_one_shot_observe() {
        let element = BridgeNode::new_element_with_attrs(
            "widget",
            &[("my-title", "hello"), ("id", "w1")],
        );
        let attrs = Attributes::from_element(&element);
        assert!(attrs.has("myTitle"));
        assert_eq!(attrs.get("myTitle"), Some("hello".to_string()));

        let count = Rc::new(Cell::new(0u32));
        let c = count.clone();
        attrs.observe("myTitle", move |value| {
            assert_eq!(value, "hello");
            c.set(c.get() + 1);
        });
        attrs.flush_observers();
        attrs.flush_observers();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_controller_hook_level_resolution() {
        let none = ControllerBuilder::new().build();
        assert_eq!(none.hook_level(), HookLevel::NoHooks);

        let init_only = ControllerBuilder::new().on_init(|_| {}).build();
        assert_eq!(init_only.hook_level(), HookLevel::InitOnly);

        let full = ControllerBuilder::new().do_check(|_| {}).build();
        assert_eq!(full.hook_level(), HookLevel::Full);
    }

    #[test]
    fn test_registry_requires_exactly_one_definition() {
        let registry = DirectiveRegistry::new();
        assert!(registry.get_single("gone").is_err());

        registry.register(DirectiveDefinition::new("widget"));
        assert!(registry.get_single("widget").is_ok());

        registry.register(DirectiveDefinition::new("widget"));
        let err = registry.get_single("widget").err().unwrap();
        assert_eq!(err.code, crate::error::ERR_DIRECTIVE_MULTIPLE);
    }

    #[test]
    fn test_registry_uniqueness_tolerates_absence() {
        let registry = DirectiveRegistry::new();
        assert!(registry.ensure_unique("gone").is_ok());

        registry.register(DirectiveDefinition::new("widget"));
        assert!(registry.ensure_unique("widget").is_ok());

        registry.register(DirectiveDefinition::new("widget"));
        let err = registry.ensure_unique("widget").err().unwrap();
        assert_eq!(err.code, crate::error::ERR_DIRECTIVE_MULTIPLE);
    }
}
