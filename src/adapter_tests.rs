use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::binding::Changes;
use crate::dom::{controller_data_key, BridgeNode, NodeHandle};
use crate::inbound::{DowngradeAdapter, DowngradeOptions};
use crate::legacy::{
    ControllerBuilder, DirectiveDefinition, DirectiveRegistry, Expression, Scope,
    TemplateSource, TranscludeSpec,
};
use crate::modern::{
    ComponentDescriptor, ComponentFactory, ComponentInstanceBuilder, DiagnosticsRegistry,
    Injector,
};
use crate::outbound::{UpgradeAdapter, UpgradeHelper};
use crate::value::Value;

fn descriptor(inputs: &[&str], outputs: &[&str]) -> ComponentDescriptor {
    ComponentDescriptor {
        component_name: "TestComponent".to_string(),
        selector: "test-component".to_string(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        content_selectors: Vec::new(),
    }
}

/// Factory producing an instance with the given outputs; every changes
/// notification the adapter delivers is pushed onto `batches`.
fn recording_factory(
    outputs: &[&str],
    batches: Rc<RefCell<Vec<Changes>>>,
) -> ComponentFactory {
    let outputs: Vec<String> = outputs.iter().map(|s| s.to_string()).collect();
    Rc::new(move |_, _| {
        let mut builder = ComponentInstanceBuilder::new("TestComponent");
        for output in &outputs {
            builder = builder.output(output);
        }
        let sink = batches.clone();
        builder
            .on_changes(move |changes| sink.borrow_mut().push(changes.clone()))
            .build()
    })
}

struct RecordingDiagnostics {
    registered: Cell<u32>,
    unregistered: Cell<u32>,
}

impl DiagnosticsRegistry for RecordingDiagnostics {
    fn register(&self, _element: &NodeHandle, _component_name: &str) {
        self.registered.set(self.registered.get() + 1);
    }
    fn unregister(&self, _element: &NodeHandle) {
        self.unregistered.set(self.unregistered.get() + 1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// INBOUND ADAPTER
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_downgraded_inputs_batch_per_digest() {
    let scope = Scope::root();
    let element = BridgeNode::new_element_with_attrs(
        "test-component",
        &[("[hero]", "hero"), ("[rank]", "rank")],
    );
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&["hero", "rank"], &[]),
        Some(recording_factory(&[], batches.clone())),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();

    scope.set("hero", Value::from("magneta"));
    scope.set("rank", Value::from(1i64));
    scope.digest();

    assert_eq!(batches.borrow().len(), 1);
    let recorded = batches.borrow();
    let first = &recorded[0];
    assert_eq!(first.len(), 2);
    assert!(first["hero"].is_first_change());
    assert_eq!(first["hero"].current_value, Value::from("magneta"));
    assert_eq!(adapter.detector().runs(), 1);
    drop(recorded);

    scope.set("hero", Value::from("dr nice"));
    scope.digest();

    assert_eq!(batches.borrow().len(), 2);
    let recorded = batches.borrow();
    let second = &recorded[1];
    assert_eq!(second.len(), 1);
    assert!(!second["hero"].is_first_change());
    assert_eq!(second["hero"].previous_value, Value::from("magneta"));
}

#[test]
fn test_static_attribute_delivered_once_as_string() {
    let scope = Scope::root();
    let element = BridgeNode::new_element_with_attrs("test-component", &[("hero", "magneta")]);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&["hero"], &[]),
        Some(recording_factory(&[], batches.clone())),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();

    scope.digest();
    scope.digest();

    assert_eq!(batches.borrow().len(), 1);
    let recorded = batches.borrow();
    let batch = &recorded[0];
    assert!(batch["hero"].is_first_change());
    assert_eq!(batch["hero"].current_value, Value::from("magneta"));
    let component = adapter.component().unwrap();
    assert_eq!(component.get_input("hero"), Some(Value::from("magneta")));
}

#[test]
fn test_kebab_case_static_attribute_input() {
    let scope = Scope::root();
    let element =
        BridgeNode::new_element_with_attrs("test-component", &[("my-title", "hello")]);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&["title: my-title"], &[]),
        Some(recording_factory(&[], batches.clone())),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();

    scope.digest();

    assert_eq!(batches.borrow().len(), 1);
    let component = adapter.component().unwrap();
    assert_eq!(component.get_input("title"), Some(Value::from("hello")));
}

#[test]
fn test_kebab_case_expression_input() {
    let scope = Scope::root();
    scope.set("name", Value::from("magneta"));
    let element =
        BridgeNode::new_element_with_attrs("test-component", &[("[my-title]", "name")]);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&["title: my-title"], &[]),
        Some(recording_factory(&[], batches.clone())),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();

    scope.digest();
    let component = adapter.component().unwrap();
    assert_eq!(component.get_input("title"), Some(Value::from("magneta")));

    scope.set("name", Value::from("dr nice"));
    scope.digest();
    assert_eq!(component.get_input("title"), Some(Value::from("dr nice")));
    assert_eq!(batches.borrow().len(), 2);
}

#[test]
fn test_output_evaluation_subscription_passes_event() {
    let scope = Scope::root();
    let seen = Rc::new(RefCell::new(Value::Null));
    let sink = seen.clone();
    scope.register_method(
        "onDelete",
        Rc::new(move |args: &[Value]| {
            *sink.borrow_mut() = args.first().cloned().unwrap_or(Value::Null);
            Value::Null
        }),
    );

    let element = BridgeNode::new_element_with_attrs(
        "test-component",
        &[("(deleted)", "onDelete($event)")],
    );
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&[], &["deleted"]),
        Some(recording_factory(&["deleted"], batches)),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();

    let emitter = adapter.component().unwrap().get_output("deleted").unwrap();
    emitter.emit(Value::from(42i64));
    assert_eq!(*seen.borrow(), Value::from(42i64));
}

#[test]
fn test_two_way_assignment_writes_back_to_scope() {
    let scope = Scope::root();
    let element =
        BridgeNode::new_element_with_attrs("test-component", &[("[(count)]", "count")]);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&["count"], &["countChange"]),
        Some(recording_factory(&["countChange"], batches)),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();

    let emitter = adapter
        .component()
        .unwrap()
        .get_output("countChange")
        .unwrap();
    emitter.emit(Value::from(7i64));
    assert_eq!(scope.get("count"), Some(Value::from(7i64)));
}

#[test]
fn test_two_way_target_must_be_assignable() {
    let scope = Scope::root();
    let element =
        BridgeNode::new_element_with_attrs("test-component", &[("[(count)]", "reset()")]);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&[], &["countChange"]),
        Some(recording_factory(&["countChange"], batches)),
        Injector::new(),
        DowngradeOptions::default(),
    );
    let err = adapter.activate().unwrap_err();
    assert_eq!(err.code, crate::error::ERR_BINDING_NOT_ASSIGNABLE);
}

#[test]
fn test_missing_factory_names_component() {
    let scope = Scope::root();
    let element = BridgeNode::new_element("test-component");
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&[], &[]),
        None,
        Injector::new(),
        DowngradeOptions::default(),
    );
    let err = adapter.activate().unwrap_err();
    assert_eq!(err.code, crate::error::ERR_COMPONENT_FACTORY);
    assert!(err.message.contains("TestComponent"));
}

#[test]
fn test_missing_output_emitter_is_reported() {
    let scope = Scope::root();
    let element = BridgeNode::new_element_with_attrs(
        "test-component",
        &[("(deleted)", "onDelete($event)")],
    );
    let batches = Rc::new(RefCell::new(Vec::new()));
    // The instance declares no emitters at all.
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&[], &["deleted"]),
        Some(recording_factory(&[], batches)),
        Injector::new(),
        DowngradeOptions::default(),
    );
    let err = adapter.activate().unwrap_err();
    assert_eq!(err.code, crate::error::ERR_OUTPUT_MISSING);
}

#[test]
fn test_content_projection_groups_by_first_match() {
    let scope = Scope::root();
    let element = BridgeNode::new_element("test-component");
    element.append_child(BridgeNode::new_element("h1"));
    element.append_child(BridgeNode::new_element("span"));
    element.append_child(BridgeNode::new_text("stray"));

    let mut desc = descriptor(&[], &[]);
    desc.content_selectors = vec!["h1".to_string(), "*".to_string()];

    let shapes: Rc<RefCell<Vec<Vec<Option<String>>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = shapes.clone();
    let factory: ComponentFactory = Rc::new(move |_, projected| {
        *sink.borrow_mut() = projected
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|node| node.tag().map(str::to_string))
                    .collect()
            })
            .collect();
        ComponentInstanceBuilder::new("TestComponent").build()
    });

    let adapter = DowngradeAdapter::new(
        element.clone(),
        &scope,
        desc,
        Some(factory),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();

    let shapes = shapes.borrow();
    assert_eq!(shapes.len(), 2);
    assert_eq!(shapes[0], vec![Some("h1".to_string())]);
    assert_eq!(shapes[1], vec![Some("span".to_string()), None]);
    assert!(element.children().is_empty());
}

#[test]
fn test_downgrade_teardown_once_from_either_side() {
    let scope = Scope::root();
    let element = BridgeNode::new_element("test-component");
    let batches = Rc::new(RefCell::new(Vec::new()));
    let diagnostics = Rc::new(RecordingDiagnostics {
        registered: Cell::new(0),
        unregistered: Cell::new(0),
    });
    let adapter = DowngradeAdapter::new(
        element.clone(),
        &scope,
        descriptor(&[], &[]),
        Some(recording_factory(&[], batches)),
        Injector::new(),
        DowngradeOptions {
            diagnostics: Some(diagnostics.clone()),
            ..DowngradeOptions::default()
        },
    );
    adapter.activate().unwrap();
    assert_eq!(diagnostics.registered.get(), 1);

    element.destroy();
    assert!(adapter.component().is_none());
    assert_eq!(diagnostics.unregistered.get(), 1);

    // The scope side fires second; nothing doubles up.
    scope.destroy();
    assert_eq!(diagnostics.unregistered.get(), 1);
}

#[test]
fn test_downgrade_teardown_releases_host_watches() {
    let scope = Scope::root();
    scope.set("name", Value::from("magneta"));
    let element =
        BridgeNode::new_element_with_attrs("test-component", &[("[hero]", "name")]);
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        element.clone(),
        &scope,
        descriptor(&["hero"], &[]),
        Some(recording_factory(&[], batches.clone())),
        Injector::new(),
        DowngradeOptions::default(),
    );

    assert_eq!(scope.watch_count(), 0);
    adapter.activate().unwrap();
    // One watch per live input plus the aggregated flush watch.
    assert_eq!(scope.watch_count(), 2);

    scope.digest();
    assert_eq!(batches.borrow().len(), 1);

    element.destroy();
    assert_eq!(scope.watch_count(), 0);

    // The host scope keeps digesting; nothing reaches the dead component.
    scope.set("name", Value::from("dr nice"));
    scope.digest();
    assert_eq!(batches.borrow().len(), 1);
}

#[test]
fn test_duplicate_directive_name_rejected_inbound() {
    let registry = Rc::new(DirectiveRegistry::new());
    registry.register(DirectiveDefinition::new("TestComponent"));
    registry.register(DirectiveDefinition::new("TestComponent"));

    let scope = Scope::root();
    let batches = Rc::new(RefCell::new(Vec::new()));
    let adapter = DowngradeAdapter::new(
        BridgeNode::new_element("test-component"),
        &scope,
        descriptor(&[], &[]),
        Some(recording_factory(&[], batches)),
        Injector::new(),
        DowngradeOptions {
            registry: Some(registry),
            ..DowngradeOptions::default()
        },
    );
    let err = adapter.activate().unwrap_err();
    assert_eq!(err.code, crate::error::ERR_DIRECTIVE_MULTIPLE);
}

#[test]
fn test_scope_token_available_to_factory() {
    let scope = Scope::root();
    scope.set("marker", Value::from("here"));
    let element = BridgeNode::new_element("test-component");
    let found = Rc::new(RefCell::new(None));
    let sink = found.clone();
    let factory: ComponentFactory = Rc::new(move |injector, _| {
        let provided = injector
            .get(crate::modern::SCOPE_TOKEN)
            .and_then(|p| p.downcast::<Rc<Scope>>().ok())
            .and_then(|s| s.get("marker"));
        *sink.borrow_mut() = provided;
        ComponentInstanceBuilder::new("TestComponent").build()
    });
    let adapter = DowngradeAdapter::new(
        element,
        &scope,
        descriptor(&[], &[]),
        Some(factory),
        Injector::new(),
        DowngradeOptions::default(),
    );
    adapter.activate().unwrap();
    assert_eq!(*found.borrow(), Some(Value::from("here")));
}

// ═══════════════════════════════════════════════════════════════════════════
// OUTBOUND ADAPTER
// ═══════════════════════════════════════════════════════════════════════════

fn simple_directive(name: &str) -> DirectiveDefinition {
    let mut directive = DirectiveDefinition::new(name);
    directive.template = Some(TemplateSource::Inline("<span></span>".to_string()));
    directive
}

fn registry_with(directive: DirectiveDefinition) -> DirectiveRegistry {
    let registry = DirectiveRegistry::new();
    registry.register(directive);
    registry
}

#[test]
fn test_upgraded_two_way_emits_once_per_change() {
    let mut directive = simple_directive("counter");
    let mut bindings = BTreeMap::new();
    bindings.insert("value".to_string(), "=".to_string());
    directive.scope_bindings = Some(bindings);
    let registry = registry_with(directive);

    let parent = Scope::root();
    let element = BridgeNode::new_element("counter");
    let adapter = UpgradeAdapter::new(&registry, "counter", element, &parent, None).unwrap();
    adapter.on_init().unwrap();

    let emitted = Rc::new(RefCell::new(Vec::new()));
    let sink = emitted.clone();
    adapter
        .output("valueChange")
        .unwrap()
        .subscribe(move |value| sink.borrow_mut().push(value));

    adapter.scope().set("value", Value::from(1i64));
    parent.digest();
    assert_eq!(*emitted.borrow(), vec![Value::from(1i64)]);

    adapter.scope().set("value", Value::from(2i64));
    parent.digest();
    assert_eq!(emitted.borrow().len(), 2);

    // Same value again: nothing new.
    adapter.scope().set("value", Value::from(2i64));
    parent.digest();
    assert_eq!(emitted.borrow().len(), 2);
}

#[test]
fn test_upgraded_nan_is_identical_to_nan() {
    let mut directive = simple_directive("counter");
    let mut bindings = BTreeMap::new();
    bindings.insert("value".to_string(), "=".to_string());
    directive.scope_bindings = Some(bindings);
    let registry = registry_with(directive);

    let parent = Scope::root();
    let element = BridgeNode::new_element("counter");
    let adapter = UpgradeAdapter::new(&registry, "counter", element, &parent, None).unwrap();
    adapter.on_init().unwrap();

    let count = Rc::new(Cell::new(0u32));
    let c = count.clone();
    adapter
        .output("valueChange")
        .unwrap()
        .subscribe(move |_| c.set(c.get() + 1));

    adapter.scope().set("value", Value::from(f64::NAN));
    parent.digest();
    assert_eq!(count.get(), 1);

    adapter.scope().set("value", Value::from(f64::NAN));
    parent.digest();
    assert_eq!(count.get(), 1);
}

#[test]
fn test_expression_binding_surfaces_as_output() {
    let mut directive = simple_directive("saver");
    let mut bindings = BTreeMap::new();
    bindings.insert("onSave".to_string(), "&".to_string());
    directive.scope_bindings = Some(bindings);
    let registry = registry_with(directive);

    let parent = Scope::root();
    let element = BridgeNode::new_element("saver");
    let adapter = UpgradeAdapter::new(&registry, "saver", element, &parent, None).unwrap();
    adapter.on_init().unwrap();

    let seen = Rc::new(RefCell::new(Value::Null));
    let sink = seen.clone();
    adapter
        .output("onSave")
        .unwrap()
        .subscribe(move |value| *sink.borrow_mut() = value);

    // The legacy side invokes its `&` binding as an expression.
    let expr = Expression::parse("onSave($event)").unwrap();
    let mut locals = std::collections::HashMap::new();
    locals.insert("$event".to_string(), Value::from("saved"));
    expr.eval_with_locals(adapter.scope(), &locals);

    assert_eq!(*seen.borrow(), Value::from("saved"));
}

#[test]
fn test_host_changes_buffered_until_init() {
    let replayed = Rc::new(RefCell::new(Vec::new()));
    let sink = replayed.clone();

    let mut directive = simple_directive("widget");
    let mut bindings = BTreeMap::new();
    bindings.insert("title".to_string(), "<".to_string());
    directive.scope_bindings = Some(bindings);
    directive.controller = Some(Rc::new(move |_, _, _| {
        let sink = sink.clone();
        ControllerBuilder::new()
            .on_changes(move |_, changes| {
                sink.borrow_mut().push(changes.clone());
            })
            .build()
    }));
    let registry = registry_with(directive);

    let parent = Scope::root();
    let element = BridgeNode::new_element("widget");
    let adapter = UpgradeAdapter::new(&registry, "widget", element, &parent, None).unwrap();

    let mut changes = Changes::new();
    changes.insert(
        "title".to_string(),
        crate::binding::PropertyChange::new(Value::Null, Value::from("hello"), true),
    );
    adapter.on_changes(changes);
    assert!(replayed.borrow().is_empty());

    adapter.on_init().unwrap();
    assert_eq!(replayed.borrow().len(), 1);
    assert_eq!(adapter.scope().get("title"), Some(Value::from("hello")));
}

#[test]
fn test_template_url_requires_fetcher() {
    let mut directive = DirectiveDefinition::new("remote");
    directive.template = Some(TemplateSource::Url("/remote.html".to_string()));
    let registry = registry_with(directive);

    let parent = Scope::root();
    let adapter = UpgradeAdapter::new(
        &registry,
        "remote",
        BridgeNode::new_element("remote"),
        &parent,
        None,
    )
    .unwrap();
    let err = adapter.on_init().unwrap_err();
    assert_eq!(err.code, crate::error::ERR_TEMPLATE_MISSING);

    let element = BridgeNode::new_element("remote");
    let adapter = UpgradeAdapter::new(
        &registry,
        "remote",
        element.clone(),
        &parent,
        Some(Rc::new(|_| Ok("<b>remote</b>".to_string()))),
    )
    .unwrap();
    adapter.on_init().unwrap();
    assert_eq!(element.children().len(), 1);
    assert_eq!(element.children()[0].tag(), Some("b"));

    let adapter = UpgradeAdapter::new(
        &registry,
        "remote",
        BridgeNode::new_element("remote"),
        &parent,
        Some(Rc::new(|_| Err("404".to_string()))),
    )
    .unwrap();
    let err = adapter.on_init().unwrap_err();
    assert_eq!(err.code, crate::error::ERR_TEMPLATE_FETCH);
}

#[test]
fn test_unsupported_directive_features_rejected() {
    let mut directive = simple_directive("replacer");
    directive.replace = true;
    let registry = registry_with(directive);
    let err = UpgradeHelper::new(
        &registry,
        "replacer",
        BridgeNode::new_element("replacer"),
        None,
    )
    .err()
    .unwrap();
    assert_eq!(err.code, crate::error::ERR_DIRECTIVE_UNSUPPORTED);
}

#[test]
fn test_require_resolves_through_ancestors() {
    let registry = registry_with(simple_directive("child"));

    let parent_element = BridgeNode::new_element("parent-dir");
    let controller = ControllerBuilder::new().build();
    controller.set_property("tag", Value::from("parent"));
    parent_element.set_data(&controller_data_key("parentDir"), Rc::new(controller));

    let child_element = BridgeNode::new_element("child");
    parent_element.append_child(child_element.clone());

    let helper = UpgradeHelper::new(&registry, "child", child_element, None).unwrap();

    let found = helper.resolve_single_require("^parentDir").unwrap();
    assert_eq!(
        found.and_then(|c| c.get_property("tag")),
        Some(Value::from("parent"))
    );

    // Without the ancestor marker only the element's own data counts.
    let err = helper.resolve_single_require("parentDir").err().unwrap();
    assert_eq!(err.code, crate::error::ERR_REQUIRE_NOT_FOUND);

    assert!(helper
        .resolve_single_require("?missingDir")
        .unwrap()
        .is_none());
}

#[test]
fn test_require_parent_marker_skips_own_element() {
    let registry = registry_with(simple_directive("child"));
    let child_element = BridgeNode::new_element("child");
    let controller = ControllerBuilder::new().build();
    child_element.set_data(&controller_data_key("childDir"), Rc::new(controller));

    let helper = UpgradeHelper::new(&registry, "child", child_element, None).unwrap();
    assert!(helper.resolve_single_require("childDir").unwrap().is_some());
    let err = helper.resolve_single_require("^^childDir").err().unwrap();
    assert_eq!(err.code, crate::error::ERR_REQUIRE_NOT_FOUND);
}

#[test]
fn test_transclusion_slots_partition_and_patch_whitespace() {
    let mut directive = simple_directive("pane");
    let mut slots = BTreeMap::new();
    slots.insert("header".to_string(), "pane-header".to_string());
    slots.insert("footer".to_string(), "?pane-footer".to_string());
    directive.transclude = Some(TranscludeSpec::Slots(slots));
    let registry = registry_with(directive);

    let element = BridgeNode::new_element("pane");
    element.append_child(BridgeNode::new_element("pane-header"));
    element.append_child(BridgeNode::new_element("div"));
    element.append_child(BridgeNode::new_text("   "));

    let helper = UpgradeHelper::new(&registry, "pane", element, None).unwrap();
    let content = helper.prepare_transclusion().unwrap().unwrap();
    assert_eq!(content.slots["header"].len(), 1);
    assert!(content.slots["footer"].is_empty());
    assert_eq!(content.default.len(), 2);
    assert_eq!(
        content.default[1].text_content(),
        Some("\u{200C}".to_string())
    );
}

#[test]
fn test_transclusion_required_slot_must_fill() {
    let mut directive = simple_directive("pane");
    let mut slots = BTreeMap::new();
    slots.insert("header".to_string(), "pane-header".to_string());
    directive.transclude = Some(TranscludeSpec::Slots(slots));
    let registry = registry_with(directive);

    let element = BridgeNode::new_element("pane");
    element.append_child(BridgeNode::new_element("div"));
    let helper = UpgradeHelper::new(&registry, "pane", element, None).unwrap();
    let err = helper.prepare_transclusion().err().unwrap();
    assert_eq!(err.code, crate::error::ERR_SLOT_UNFILLED);
}

#[test]
fn test_upgrade_destroy_runs_hooks_once_from_either_side() {
    let destroyed = Rc::new(Cell::new(0u32));
    let sink = destroyed.clone();

    let mut directive = simple_directive("widget");
    directive.controller = Some(Rc::new(move |_, _, _| {
        let sink = sink.clone();
        ControllerBuilder::new()
            .on_destroy(move |_| sink.set(sink.get() + 1))
            .build()
    }));
    let registry = registry_with(directive);

    let parent = Scope::root();
    let element = BridgeNode::new_element("widget");
    let adapter =
        UpgradeAdapter::new(&registry, "widget", element.clone(), &parent, None).unwrap();
    adapter.on_init().unwrap();

    element.destroy();
    assert_eq!(destroyed.get(), 1);
    adapter.on_destroy();
    assert_eq!(destroyed.get(), 1);
    assert!(adapter.controller().is_none());
}
