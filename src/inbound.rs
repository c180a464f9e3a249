//! Inbound adapter: hosts a modern component on an element owned by the
//! legacy framework.
//!
//! Activation is a single linear pass: project the element's content into
//! the descriptor's selector groups, create the component through its
//! factory, wire inputs to scope watches, wire outputs to scope expressions,
//! then register teardown with both frameworks. Input changes observed in
//! one digest are delivered as one batched notification.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crate::binding::{camelize, Changes, PropertyBinding, PropertyChange};
use crate::dom::NodeHandle;
use crate::error::{
    BridgeError, ERR_BINDING_NOT_ASSIGNABLE, ERR_COMPONENT_FACTORY, ERR_OUTPUT_MISSING,
};
use crate::legacy::{
    Attributes, DirectiveRegistry, Expression, PassthroughCompiler, Scope, TemplateCompiler,
};
use crate::modern::{
    ChangeDetector, ComponentDescriptor, ComponentFactory, ComponentInstance,
    DiagnosticsRegistry, Injector, SCOPE_TOKEN,
};
use crate::projection::group_nodes_by_selector;
use crate::value::Value;

pub struct DowngradeOptions {
    pub compiler: Rc<dyn TemplateCompiler>,
    pub diagnostics: Option<Rc<dyn DiagnosticsRegistry>>,
    /// The legacy registry the component's wrapper directive lives in, when
    /// one exists. Activation fails if the name is registered more than once.
    pub registry: Option<Rc<DirectiveRegistry>>,
    /// When set, every digest also runs a change-detection pass; otherwise
    /// the component is only marked for its host's next check.
    pub propagate_digest: bool,
}

impl Default for DowngradeOptions {
    fn default() -> Self {
        DowngradeOptions {
            compiler: Rc::new(PassthroughCompiler),
            diagnostics: None,
            registry: None,
            propagate_digest: true,
        }
    }
}

pub struct DowngradeAdapter {
    element: NodeHandle,
    attrs: Rc<Attributes>,
    scope: Rc<Scope>,
    component_scope: Rc<Scope>,
    descriptor: ComponentDescriptor,
    factory: Option<ComponentFactory>,
    parent_injector: Rc<Injector>,
    compiler: Rc<dyn TemplateCompiler>,
    detector: ChangeDetector,
    diagnostics: Option<Rc<dyn DiagnosticsRegistry>>,
    registry: Option<Rc<DirectiveRegistry>>,
    propagate_digest: bool,
    component: RefCell<Option<Rc<ComponentInstance>>>,
    projected: RefCell<Vec<Vec<NodeHandle>>>,
    input_change_count: Cell<u64>,
    pending_changes: RefCell<Changes>,
    seen_props: RefCell<HashSet<String>>,
    host_watch_ids: RefCell<Vec<u64>>,
    torn_down: Cell<bool>,
}

impl DowngradeAdapter {
    pub fn new(
        element: NodeHandle,
        scope: &Rc<Scope>,
        descriptor: ComponentDescriptor,
        factory: Option<ComponentFactory>,
        parent_injector: Rc<Injector>,
        options: DowngradeOptions,
    ) -> Rc<DowngradeAdapter> {
        let attrs = Rc::new(Attributes::from_element(&element));
        Rc::new(DowngradeAdapter {
            element,
            attrs,
            scope: scope.clone(),
            component_scope: scope.new_child(),
            descriptor,
            factory,
            parent_injector,
            compiler: options.compiler,
            detector: ChangeDetector::new(),
            diagnostics: options.diagnostics,
            registry: options.registry,
            propagate_digest: options.propagate_digest,
            component: RefCell::new(None),
            projected: RefCell::new(Vec::new()),
            input_change_count: Cell::new(0),
            pending_changes: RefCell::new(Changes::new()),
            seen_props: RefCell::new(HashSet::new()),
            host_watch_ids: RefCell::new(Vec::new()),
            torn_down: Cell::new(false),
        })
    }

    pub fn detector(&self) -> ChangeDetector {
        self.detector.clone()
    }

    pub fn component(&self) -> Option<Rc<ComponentInstance>> {
        self.component.borrow().clone()
    }

    /// Run the full linking sequence. Must be called exactly once, before
    /// the first digest that should reach the component.
    pub fn activate(self: &Rc<Self>) -> Result<(), BridgeError> {
        if let Some(registry) = &self.registry {
            registry.ensure_unique(&self.descriptor.component_name)?;
        }
        self.compile_contents()?;
        self.create_component()?;
        self.setup_inputs()?;
        self.setup_outputs()?;
        self.register_cleanup();
        Ok(())
    }

    /// Detach the host element's children and group them by the
    /// descriptor's content selectors. Groups are compiled against the
    /// component's child scope so legacy directives inside them stay live.
    fn compile_contents(&self) -> Result<(), BridgeError> {
        let contents = self.element.take_children();
        let selectors = if self.descriptor.content_selectors.is_empty() {
            vec!["*".to_string()]
        } else {
            self.descriptor.content_selectors.clone()
        };
        let groups = group_nodes_by_selector(&selectors, &contents)?;
        let compiled: Vec<Vec<NodeHandle>> = groups
            .into_iter()
            .map(|group| self.compiler.compile_nodes(&self.component_scope, group))
            .collect();
        *self.projected.borrow_mut() = compiled;
        Ok(())
    }

    fn create_component(&self) -> Result<(), BridgeError> {
        let factory = self.factory.as_ref().ok_or_else(|| {
            BridgeError::missing(
                ERR_COMPONENT_FACTORY,
                &format!(
                    "no component factory available for '{}'",
                    self.descriptor.component_name
                ),
            )
        })?;
        let injector = self.parent_injector.child();
        injector.provide(SCOPE_TOKEN, Rc::new(self.scope.clone()));
        let component = factory(&injector, &self.projected.borrow());
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.register(&self.element, &self.descriptor.component_name);
        }
        *self.component.borrow_mut() = Some(component);
        Ok(())
    }

    fn setup_inputs(self: &Rc<Self>) -> Result<(), BridgeError> {
        let mut has_static = false;
        for spec in &self.descriptor.inputs {
            let binding = PropertyBinding::parse(spec);
            // `Attributes` keys are camelized from the kebab-case DOM names,
            // so every variant is normalized the same way before lookup.
            let static_attr = camelize(&binding.attr);
            if self.attrs.has(&static_attr) {
                // Literal attribute: delivered once, as a string, during the
                // first digest after linking.
                has_static = true;
                let adapter = Rc::downgrade(self);
                let prop = binding.prop.clone();
                self.attrs.observe(&static_attr, move |value| {
                    if let Some(adapter) = adapter.upgrade() {
                        adapter.update_input(&prop, Value::from(value));
                    }
                });
                continue;
            }

            let expression = [
                &binding.bracket_attr,
                &binding.bracket_paren_attr,
                &binding.bind_attr,
                &binding.bindon_attr,
            ]
            .iter()
            .find_map(|attr| self.attrs.get(&camelize(attr)));
            if let Some(source) = expression {
                let expr = Expression::parse(&source)?;
                let adapter = Rc::downgrade(self);
                let prop = binding.prop.clone();
                let id = self.scope.watch(
                    move |scope| expr.eval(scope),
                    move |new, _, _| {
                        if let Some(adapter) = adapter.upgrade() {
                            adapter.update_input(&prop, new.clone());
                        }
                    },
                );
                self.host_watch_ids.borrow_mut().push(id);
            }
        }

        if has_static {
            let attrs = self.attrs.clone();
            self.scope
                .defer_one_digest(move || attrs.flush_observers());
        }

        // One aggregated watch flushes everything recorded during the pass
        // as a single batched notification.
        let adapter = Rc::downgrade(self);
        let id = self.scope.watch(
            {
                let adapter = Rc::downgrade(self);
                move |_| match adapter.upgrade() {
                    Some(adapter) => Value::from(adapter.input_change_count.get() as f64),
                    None => Value::Null,
                }
            },
            move |_, _, _| {
                if let Some(adapter) = adapter.upgrade() {
                    adapter.flush_pending();
                }
            },
        );
        self.host_watch_ids.borrow_mut().push(id);
        Ok(())
    }

    fn update_input(&self, prop: &str, value: Value) {
        let component = self.component.borrow().clone();
        let component = match component {
            Some(component) => component,
            None => return,
        };
        let previous = component.get_input(prop).unwrap_or(Value::Null);
        let first_change = self.seen_props.borrow_mut().insert(prop.to_string());
        component.set_input(prop, value.clone());

        let mut pending = self.pending_changes.borrow_mut();
        match pending.get_mut(prop) {
            // Coalesce repeated updates within one digest, keeping the
            // oldest previous value.
            Some(change) => change.current_value = value,
            None => {
                pending.insert(
                    prop.to_string(),
                    PropertyChange::new(previous, value, first_change),
                );
            }
        }
        drop(pending);
        self.input_change_count
            .set(self.input_change_count.get() + 1);
    }

    fn flush_pending(&self) {
        let changes: Changes = self.pending_changes.borrow_mut().drain().collect();
        if changes.is_empty() {
            return;
        }
        if let Some(component) = self.component.borrow().as_ref() {
            if component.has_changes_hook() {
                component.call_on_changes(&changes);
            }
        }
        if self.propagate_digest {
            self.detector.detect_changes();
        } else {
            self.detector.mark_for_check();
        }
    }

    fn setup_outputs(self: &Rc<Self>) -> Result<(), BridgeError> {
        for spec in &self.descriptor.outputs {
            let binding = PropertyBinding::parse(spec);

            // A `<base>Change` output accepts assignment-style two-way
            // syntax on the base attribute.
            if let Some(base_attr) = binding.attr.strip_suffix("Change") {
                let base = PropertyBinding::new(&binding.prop, base_attr);
                let assignment = self
                    .attrs
                    .get(&camelize(&base.bracket_paren_attr))
                    .or_else(|| self.attrs.get(&camelize(&base.bindon_attr)));
                if let Some(source) = assignment {
                    let expr = Expression::parse(&source)?;
                    if !expr.is_assignable() {
                        return Err(BridgeError::binding(
                            ERR_BINDING_NOT_ASSIGNABLE,
                            &format!(
                                "expression '{}' bound to output '{}' is not assignable",
                                source, binding.prop
                            ),
                        ));
                    }
                    let emitter = self.output_emitter(&binding.prop)?;
                    let scope = self.scope.clone();
                    emitter.subscribe(move |value| {
                        scope.apply(|s| {
                            let _ = expr.assign(s, value);
                        });
                    });
                    continue;
                }
            }

            let handler = self
                .attrs
                .get(&camelize(&binding.on_attr))
                .or_else(|| self.attrs.get(&camelize(&binding.paren_attr)));
            if let Some(source) = handler {
                let expr = Expression::parse(&source)?;
                let emitter = self.output_emitter(&binding.prop)?;
                let scope = self.scope.clone();
                emitter.subscribe(move |value| {
                    scope.apply(|s| {
                        let mut locals = std::collections::HashMap::new();
                        locals.insert("$event".to_string(), value);
                        expr.eval_with_locals(s, &locals);
                    });
                });
            }
        }
        Ok(())
    }

    fn output_emitter(&self, prop: &str) -> Result<crate::modern::EventEmitter, BridgeError> {
        let component = self.component.borrow().clone();
        component
            .as_ref()
            .and_then(|component| component.get_output(prop))
            .ok_or_else(|| {
                BridgeError::missing(
                    ERR_OUTPUT_MISSING,
                    &format!(
                        "missing emitter for output '{}' on component '{}'",
                        prop, self.descriptor.component_name
                    ),
                )
            })
    }

    /// Either framework may tear the pairing down first; the second signal
    /// is a no-op.
    fn register_cleanup(self: &Rc<Self>) {
        let adapter = Rc::downgrade(self);
        self.element.on_destroy(move || {
            if let Some(adapter) = adapter.upgrade() {
                adapter.teardown();
            }
        });
        let adapter = Rc::downgrade(self);
        self.component_scope.on_destroy(move || {
            if let Some(adapter) = adapter.upgrade() {
                adapter.teardown();
            }
        });
    }

    fn teardown(&self) {
        if self.torn_down.get() {
            return;
        }
        self.torn_down.set(true);
        // The input watches live on the long-lived host scope; they must
        // not outlive the component they feed.
        for id in self.host_watch_ids.borrow_mut().drain(..) {
            self.scope.unwatch(id);
        }
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.unregister(&self.element);
        }
        *self.component.borrow_mut() = None;
        self.component_scope.destroy();
    }
}
