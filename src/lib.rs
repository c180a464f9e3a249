//! # Framework Interop Bridge
//!
//! Runs components from a modern change-detection framework inside a legacy
//! digest-loop framework and vice versa, on one shared DOM tree.
//!
//! ## Wiring Invariants
//!
//! 1. **One batched notification**: all input changes a digest pass observes
//!    for one downgraded component are delivered as a single changes record.
//! 2. **First-change flags**: a change record marks the first delivery of
//!    each property; replays and later updates are not first changes.
//! 3. **Static attributes fire once**: a literal attribute input is
//!    delivered exactly once, as a string, during the first digest after
//!    linking.
//! 4. **NaN-safe dirty checks**: both the digest loop and the two-way
//!    property check treat NaN as identical to NaN.
//! 5. **Teardown is idempotent**: either framework may destroy a bridged
//!    pairing first; the second signal is a no-op.
//! 6. **Selector matching is order-stable**: wildcard selectors match after
//!    every specific selector, and projection assigns each node to its
//!    first matching slot.
//! 7. **One-shot handoffs**: the injector handoff, attribute observers, and
//!    the parked promise each deliver at most once.

mod binding;
mod bootstrap;
mod dom;
mod error;
mod future;
mod inbound;
mod legacy;
mod modern;
mod outbound;
mod projection;
mod selector;
mod value;

pub use binding::{
    parse_binding_definition, synthetic_output_name, BindingDef, BindingMode, Bindings, Changes,
    PropertyBinding, PropertyChange,
};
pub use bootstrap::{report_uncaught, ApplyBuffer, InjectorHandoff};
pub use dom::{controller_data_key, parse_fragment, BridgeNode, NodeHandle, NodeKind};
pub use error::*;
pub use future::{lookup_slot, SlotLookup, SyncPromise};
pub use inbound::{DowngradeAdapter, DowngradeOptions};
pub use legacy::{
    Attributes, Controller, ControllerBuilder, ControllerFactory, DirectiveDefinition,
    DirectiveRegistry, EditableValue, Expression, HookLevel, LinkFn, LinkSpec,
    PassthroughCompiler, RequireSpec, Scope, TemplateCompiler, TemplateSource, TranscludeFn,
    TranscludeSpec,
};
pub use modern::{
    ChangeDetector, ComponentDescriptor, ComponentFactory, ComponentInstance,
    ComponentInstanceBuilder, DiagnosticsRegistry, EventEmitter, Injector, SCOPE_TOKEN,
};
pub use outbound::{
    ResolvedRequire, TemplateFetcher, TranscludedContent, UpgradeAdapter, UpgradeHelper,
};
pub use projection::group_nodes_by_selector;
pub use selector::{CssSelector, SelectorMatcher};
pub use value::{loose_identical, Value};

#[cfg(test)]
mod adapter_tests;
