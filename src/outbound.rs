//! Outbound adapter: hosts a legacy directive inside a modern component
//! tree.
//!
//! `UpgradeHelper` does the one-time directive work: validation against the
//! supported feature set, template resolution, controller construction,
//! required-controller lookup through element data, and transclusion
//! grouping. `UpgradeAdapter` drives the lifecycle: host input changes flow
//! to the binding destination, two-way properties are dirty-checked each
//! digest against a NaN-safe cache, and `&` bindings surface as output
//! emitters.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::binding::{synthetic_output_name, Bindings, Changes};
use crate::dom::{self, controller_data_key, NodeHandle};
use crate::error::{
    BridgeError, ERR_DIRECTIVE_UNSUPPORTED, ERR_REQUIRE_NOT_FOUND, ERR_SLOT_UNFILLED,
    ERR_TEMPLATE_FETCH, ERR_TEMPLATE_MISSING,
};
use crate::legacy::{
    Attributes, Controller, DirectiveDefinition, DirectiveRegistry, LinkSpec, RequireSpec,
    Scope, TemplateSource, TranscludeFn, TranscludeSpec,
};
use crate::modern::EventEmitter;
use crate::value::{loose_identical, Value};

pub type TemplateFetcher = Rc<dyn Fn(&str) -> Result<String, String>>;

// ═══════════════════════════════════════════════════════════════════════════
// UPGRADE HELPER
// ═══════════════════════════════════════════════════════════════════════════

pub struct UpgradeHelper {
    name: String,
    directive: Rc<DirectiveDefinition>,
    element: NodeHandle,
    template_fetcher: Option<TemplateFetcher>,
}

/// Content extracted once from the host element, keyed for handoff to the
/// directive's transclusion function.
pub struct TranscludedContent {
    pub default: Vec<NodeHandle>,
    pub slots: BTreeMap<String, Vec<NodeHandle>>,
}

pub enum ResolvedRequire {
    Single(Option<Controller>),
    Multiple(Vec<Option<Controller>>),
    Map(BTreeMap<String, Option<Controller>>),
}

lazy_static! {
    static ref REQUIRE_RE: Regex = Regex::new(r"^(\^\^?)?(\?)?(\^\^?)?").unwrap();
}

impl UpgradeHelper {
    pub fn new(
        registry: &DirectiveRegistry,
        name: &str,
        element: NodeHandle,
        template_fetcher: Option<TemplateFetcher>,
    ) -> Result<UpgradeHelper, BridgeError> {
        let directive = registry.get_single(name)?;
        let unsupported: &[(&str, bool)] = &[
            ("replace", directive.replace),
            ("terminal", directive.terminal),
            ("compile", directive.has_compile),
        ];
        for (feature, used) in unsupported {
            if *used {
                return Err(BridgeError::unsupported(
                    ERR_DIRECTIVE_UNSUPPORTED,
                    &format!("directive '{}' uses unsupported feature '{}'", name, feature),
                ));
            }
        }
        Ok(UpgradeHelper {
            name: name.to_string(),
            directive,
            element,
            template_fetcher,
        })
    }

    pub fn directive(&self) -> &Rc<DirectiveDefinition> {
        &self.directive
    }

    pub fn element(&self) -> &NodeHandle {
        &self.element
    }

    pub fn get_template(&self) -> Result<String, BridgeError> {
        match &self.directive.template {
            Some(TemplateSource::Inline(template)) => Ok(template.clone()),
            Some(TemplateSource::Url(url)) => match &self.template_fetcher {
                Some(fetcher) => fetcher(url).map_err(|reason| {
                    BridgeError::missing(
                        ERR_TEMPLATE_FETCH,
                        &format!("fetching template '{}' failed: {}", url, reason),
                    )
                }),
                None => Err(BridgeError::missing(
                    ERR_TEMPLATE_MISSING,
                    &format!(
                        "directive '{}' loads its template from '{}' but no fetcher is configured",
                        self.name, url
                    ),
                )),
            },
            None => Err(BridgeError::missing(
                ERR_TEMPLATE_MISSING,
                &format!("directive '{}' has no template", self.name),
            )),
        }
    }

    /// Instantiate the controller and publish it in the element's data slot
    /// so descendants can `require` it.
    pub fn build_controller(&self, scope: &Rc<Scope>, attrs: &Attributes) -> Option<Controller> {
        let factory = self.directive.controller.as_ref()?;
        let controller = factory(scope, &self.element, attrs);
        self.element.set_data(
            &controller_data_key(&self.name),
            Rc::new(controller.clone()),
        );
        Some(controller)
    }

    /// Resolve one `require` entry. `^` searches the element and its
    /// ancestors, `^^` starts at the parent, `?` makes absence non-fatal.
    pub fn resolve_single_require(&self, require: &str) -> Result<Option<Controller>, BridgeError> {
        let caps = match REQUIRE_RE.captures(require) {
            Some(caps) => caps,
            None => return Ok(None),
        };
        let prefix_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let name = &require[prefix_len..];
        let parent_marker = caps.get(1).or_else(|| caps.get(3));
        let search_ancestors = parent_marker.is_some();
        let start_at_parent = parent_marker.map(|m| m.as_str()) == Some("^^");
        let optional = caps.get(2).is_some();

        let key = controller_data_key(name);
        let mut current = if start_at_parent {
            self.element.parent()
        } else {
            Some(self.element.clone())
        };
        while let Some(node) = current {
            if let Some(data) = node.get_data(&key) {
                if let Ok(controller) = data.downcast::<Controller>() {
                    return Ok(Some((*controller).clone()));
                }
            }
            if !search_ancestors {
                break;
            }
            current = node.parent();
        }

        if optional {
            Ok(None)
        } else {
            Err(BridgeError::missing(
                ERR_REQUIRE_NOT_FOUND,
                &format!(
                    "controller '{}' required by directive '{}' was not found",
                    name, self.name
                ),
            ))
        }
    }

    pub fn resolve_require(&self, spec: &RequireSpec) -> Result<ResolvedRequire, BridgeError> {
        match spec {
            RequireSpec::Single(require) => {
                Ok(ResolvedRequire::Single(self.resolve_single_require(require)?))
            }
            RequireSpec::Multiple(requires) => {
                let mut resolved = Vec::with_capacity(requires.len());
                for require in requires {
                    resolved.push(self.resolve_single_require(require)?);
                }
                Ok(ResolvedRequire::Multiple(resolved))
            }
            RequireSpec::Map(requires) => {
                let mut resolved = BTreeMap::new();
                for (local, require) in requires {
                    resolved.insert(local.clone(), self.resolve_single_require(require)?);
                }
                Ok(ResolvedRequire::Map(resolved))
            }
        }
    }

    /// Extract the host element's content, once, grouped for transclusion.
    /// Whitespace-only text nodes are patched to a zero-width non-joiner so
    /// downstream whitespace trimming cannot drop them.
    pub fn prepare_transclusion(&self) -> Result<Option<TranscludedContent>, BridgeError> {
        let spec = match &self.directive.transclude {
            Some(spec) => spec.clone(),
            None => return Ok(None),
        };
        let contents = self.element.take_children();
        for node in &contents {
            if let Some(text) = node.text_content() {
                if !node.is_element() && text.trim().is_empty() {
                    node.set_text("\u{200C}");
                }
            }
        }

        match spec {
            TranscludeSpec::Content => Ok(Some(TranscludedContent {
                default: contents,
                slots: BTreeMap::new(),
            })),
            TranscludeSpec::Slots(slot_map) => {
                let mut slots: BTreeMap<String, Vec<NodeHandle>> = BTreeMap::new();
                let mut selector_to_slot: BTreeMap<String, String> = BTreeMap::new();
                let mut required: Vec<String> = Vec::new();
                for (slot, selector) in &slot_map {
                    let (optional, element_name) = match selector.strip_prefix('?') {
                        Some(rest) => (true, rest),
                        None => (false, selector.as_str()),
                    };
                    selector_to_slot.insert(element_name.to_lowercase(), slot.clone());
                    slots.insert(slot.clone(), Vec::new());
                    if !optional {
                        required.push(slot.clone());
                    }
                }

                let mut default = Vec::new();
                for node in contents {
                    let slot = node
                        .tag()
                        .and_then(|tag| selector_to_slot.get(tag))
                        .cloned();
                    match slot {
                        Some(slot) => slots
                            .get_mut(&slot)
                            .map(|bucket| bucket.push(node))
                            .unwrap_or(()),
                        None => default.push(node),
                    }
                }

                for slot in required {
                    if slots.get(&slot).map(Vec::is_empty).unwrap_or(true) {
                        return Err(BridgeError::missing(
                            ERR_SLOT_UNFILLED,
                            &format!(
                                "required transclusion slot '{}' of directive '{}' received no content",
                                slot, self.name
                            ),
                        ));
                    }
                }
                Ok(Some(TranscludedContent { default, slots }))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// UPGRADE ADAPTER
// ═══════════════════════════════════════════════════════════════════════════

pub struct UpgradeAdapter {
    helper: UpgradeHelper,
    scope: Rc<Scope>,
    attrs: Rc<Attributes>,
    bindings: Bindings,
    controller: RefCell<Option<Controller>>,
    output_emitters: HashMap<String, EventEmitter>,
    pending_changes: RefCell<Option<Changes>>,
    initialized: Cell<bool>,
    destroyed: Cell<bool>,
    do_check_watch: Cell<Option<u64>>,
}

impl UpgradeAdapter {
    pub fn new(
        registry: &DirectiveRegistry,
        name: &str,
        element: NodeHandle,
        parent_scope: &Rc<Scope>,
        template_fetcher: Option<TemplateFetcher>,
    ) -> Result<Rc<UpgradeAdapter>, BridgeError> {
        let helper = UpgradeHelper::new(registry, name, element, template_fetcher)?;
        let attrs = Rc::new(Attributes::from_element(helper.element()));
        let bindings = match helper.directive().binding_map() {
            Some(map) => Bindings::from_definitions(map)?,
            None => Bindings::default(),
        };
        let scope = parent_scope.new_child();

        let mut output_emitters = HashMap::new();
        for output in bindings.property_to_output_map.values() {
            output_emitters.insert(output.clone(), EventEmitter::new());
        }
        for property in &bindings.expression_bound_properties {
            output_emitters.insert(property.clone(), EventEmitter::new());
        }

        let controller = if helper.directive().binds_to_controller() {
            helper.build_controller(&scope, &attrs)
        } else {
            None
        };

        let adapter = Rc::new(UpgradeAdapter {
            helper,
            scope,
            attrs,
            bindings,
            controller: RefCell::new(controller),
            output_emitters,
            pending_changes: RefCell::new(None),
            initialized: Cell::new(false),
            destroyed: Cell::new(false),
            do_check_watch: Cell::new(None),
        });
        adapter.wire_expression_bindings();

        let weak = Rc::downgrade(&adapter);
        adapter.helper.element().on_destroy(move || {
            if let Some(adapter) = weak.upgrade() {
                adapter.on_destroy();
            }
        });
        Ok(adapter)
    }

    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    pub fn controller(&self) -> Option<Controller> {
        self.controller.borrow().clone()
    }

    /// Emitter for a declared output: a two-way property's synthetic
    /// `<prop>Change` or an `&` binding's property name.
    pub fn output(&self, name: &str) -> Option<EventEmitter> {
        self.output_emitters.get(name).cloned()
    }

    /// `&` bindings become callable from the legacy side and emit on the
    /// matching output. The first invocation argument rides as the event.
    fn wire_expression_bindings(&self) {
        for property in &self.bindings.expression_bound_properties {
            let emitter = match self.output_emitters.get(property) {
                Some(emitter) => emitter.clone(),
                None => continue,
            };
            let callback: Rc<dyn Fn(&[Value]) -> Value> = Rc::new(move |args: &[Value]| {
                emitter.emit(args.first().cloned().unwrap_or(Value::Null));
                Value::Null
            });
            if let Some(controller) = self.controller.borrow().as_ref() {
                controller.set_callback(property, callback.clone());
            }
            self.scope.register_method(property, callback);
        }
    }

    /// Full startup: build the controller if the binding map targets the
    /// scope, seed the two-way cache, replay buffered host changes, run the
    /// init hook, start per-digest checking, then compile and link the
    /// template.
    pub fn on_init(self: &Rc<Self>) -> Result<(), BridgeError> {
        if self.controller.borrow().is_none() {
            let controller = self.helper.build_controller(&self.scope, &self.attrs);
            *self.controller.borrow_mut() = controller;
            self.wire_expression_bindings();
        }

        // Seed the cache from the destination so startup values do not
        // count as changes.
        {
            let mut last_values = self.bindings.two_way_last_values.borrow_mut();
            for (index, property) in self.bindings.two_way_bound_properties.iter().enumerate() {
                last_values[index] = self.get_destination_property(property);
            }
        }

        if let Some(changes) = self.pending_changes.borrow_mut().take() {
            self.apply_changes(&changes);
        }

        if let Some(controller) = self.controller.borrow().as_ref() {
            controller.call_on_init();
        }

        let weak = Rc::downgrade(self);
        let watch_id = self.scope.watch(
            move |_| {
                if let Some(adapter) = weak.upgrade() {
                    adapter.do_check();
                }
                Value::Null
            },
            |_, _, _| {},
        );
        self.do_check_watch.set(Some(watch_id));

        self.link()?;
        self.initialized.set(true);
        Ok(())
    }

    fn link(&self) -> Result<(), BridgeError> {
        let template = self.helper.get_template()?;
        let template_nodes = dom::parse_fragment(&template);
        let transcluded = self.helper.prepare_transclusion()?.map(Rc::new);
        let transclude: Option<TranscludeFn> = transcluded.map(|content| {
            Rc::new(move |slot: Option<&str>| match slot {
                None => content.default.clone(),
                Some(slot) => content.slots.get(slot).cloned().unwrap_or_default(),
            }) as TranscludeFn
        });

        let controller = self.controller.borrow().clone();
        let run = |link: &Option<&crate::legacy::LinkFn>| {
            if let Some(link) = link {
                link(
                    &self.scope,
                    self.helper.element(),
                    &self.attrs,
                    controller.as_ref(),
                    transclude.as_ref(),
                );
            }
        };

        match &self.helper.directive().link {
            Some(LinkSpec::PrePost { pre, post }) => {
                run(&pre.as_ref());
                self.helper.element().replace_children(template_nodes);
                run(&post.as_ref());
            }
            Some(LinkSpec::Fn(post)) => {
                self.helper.element().replace_children(template_nodes);
                run(&Some(post));
            }
            None => {
                self.helper.element().replace_children(template_nodes);
            }
        }

        if let Some(controller) = self.controller.borrow().as_ref() {
            controller.call_post_link();
        }
        Ok(())
    }

    /// Host-side input changes. Buffered until init builds the binding
    /// destination, then applied and forwarded to the changes hook.
    pub fn on_changes(&self, changes: Changes) {
        if !self.initialized.get() && self.controller.borrow().is_none() {
            let mut pending = self.pending_changes.borrow_mut();
            let buffer = pending.get_or_insert_with(Changes::new);
            for (property, change) in changes {
                buffer.insert(property, change);
            }
            return;
        }
        self.apply_changes(&changes);
    }

    fn apply_changes(&self, changes: &Changes) {
        for (property, change) in changes {
            self.set_destination_property(property, change.current_value.clone());
        }
        if let Some(controller) = self.controller.borrow().as_ref() {
            controller.call_on_changes(changes);
        }
    }

    /// Per-digest check: emit each two-way property whose destination value
    /// drifted from the cache. NaN-to-NaN is not a change.
    pub fn do_check(&self) {
        let properties = self.bindings.two_way_bound_properties.clone();
        for (index, property) in properties.iter().enumerate() {
            let current = self.get_destination_property(property);
            let emit = {
                let mut last_values = self.bindings.two_way_last_values.borrow_mut();
                if loose_identical(&last_values[index], &current) {
                    false
                } else {
                    last_values[index] = current.clone();
                    true
                }
            };
            if emit {
                if let Some(emitter) = self.output_emitters.get(&synthetic_output_name(property))
                {
                    emitter.emit(current);
                }
            }
        }
        if let Some(controller) = self.controller.borrow().as_ref() {
            controller.call_do_check();
        }
    }

    /// Idempotent teardown, reachable from the host lifecycle and from the
    /// element's own destruction.
    pub fn on_destroy(&self) {
        if self.destroyed.get() {
            return;
        }
        self.destroyed.set(true);
        if let Some(watch_id) = self.do_check_watch.take() {
            self.scope.unwatch(watch_id);
        }
        if let Some(controller) = self.controller.borrow().as_ref() {
            controller.call_on_destroy();
        }
        *self.controller.borrow_mut() = None;
        self.helper
            .element()
            .remove_data(&controller_data_key(&self.helper.name));
        self.scope.destroy();
    }

    fn destination_is_controller(&self) -> bool {
        self.helper.directive().binds_to_controller() && self.controller.borrow().is_some()
    }

    fn get_destination_property(&self, property: &str) -> Value {
        if self.destination_is_controller() {
            self.controller
                .borrow()
                .as_ref()
                .and_then(|controller| controller.get_property(property))
                .unwrap_or(Value::Null)
        } else {
            self.scope.get(property).unwrap_or(Value::Null)
        }
    }

    fn set_destination_property(&self, property: &str, value: Value) {
        if self.destination_is_controller() {
            if let Some(controller) = self.controller.borrow().as_ref() {
                controller.set_property(property, value);
            }
        } else {
            self.scope.set(property, value);
        }
    }
}
