use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_SELECTOR_NESTED_NOT: &str = "B-ERR-SELECTOR-001";
pub const ERR_SELECTOR_MULTI_NOT: &str = "B-ERR-SELECTOR-002";
pub const ERR_DIRECTIVE_MULTIPLE: &str = "B-ERR-DIRECTIVE-001";
pub const ERR_DIRECTIVE_UNSUPPORTED: &str = "B-ERR-DIRECTIVE-002";
pub const ERR_DIRECTIVE_MISSING: &str = "B-ERR-DIRECTIVE-003";
pub const ERR_REQUIRE_NOT_FOUND: &str = "B-ERR-REQUIRE-001";
pub const ERR_SLOT_UNFILLED: &str = "B-ERR-SLOT-001";
pub const ERR_TEMPLATE_MISSING: &str = "B-ERR-TEMPLATE-001";
pub const ERR_TEMPLATE_FETCH: &str = "B-ERR-TEMPLATE-002";
pub const ERR_COMPONENT_FACTORY: &str = "B-ERR-COMPONENT-001";
pub const ERR_OUTPUT_MISSING: &str = "B-ERR-COMPONENT-002";
pub const ERR_BINDING_NOT_ASSIGNABLE: &str = "B-ERR-BINDING-001";
pub const ERR_BINDING_BAD_SIGIL: &str = "B-ERR-BINDING-002";
pub const ERR_EXPRESSION_SYNTAX: &str = "B-ERR-BINDING-003";
pub const ERR_HANDOFF_CONSUMED: &str = "B-ERR-BOOTSTRAP-001";

/// The guarantee broken when a given code is raised. Surfaced alongside the
/// message so a failure is actionable without reading the adapter internals.
fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_SELECTOR_NESTED_NOT => "Selector negation cannot be nested.",
        ERR_SELECTOR_MULTI_NOT => "Selector negation holds exactly one alternative.",
        ERR_DIRECTIVE_MULTIPLE => "Exactly one directive may be registered under a name.",
        ERR_DIRECTIVE_UNSUPPORTED => {
            "Bridged directives may not declare replace, terminal, or a bare compile hook."
        }
        ERR_DIRECTIVE_MISSING => "A bridged directive must be registered before it is linked.",
        ERR_REQUIRE_NOT_FOUND => "Non-optional required controllers are present at link time.",
        ERR_SLOT_UNFILLED => "Required transclusion slots are filled by the caller.",
        ERR_TEMPLATE_MISSING => "A bridged directive declares an inline or URL template.",
        ERR_TEMPLATE_FETCH => "Remote templates are fetched only when explicitly allowed.",
        ERR_COMPONENT_FACTORY => "A component factory exists for every bridged component.",
        ERR_OUTPUT_MISSING => "Declared outputs exist as emitters on the component instance.",
        ERR_BINDING_NOT_ASSIGNABLE => {
            "Assignment-style bindings target an assignable expression."
        }
        ERR_BINDING_BAD_SIGIL => "Binding declarations use one of the @ < = & sigils.",
        ERR_EXPRESSION_SYNTAX => "Binding expressions parse under the path/callback grammar.",
        ERR_HANDOFF_CONSUMED => "The injector handoff is consumed exactly once.",
        _ => "Unknown guarantee.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BRIDGE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Which phase of the bridge contract was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Directive declares something the bridge refuses to emulate. Raised at
    /// resolution time, before any instance exists.
    UnsupportedFeature,
    /// A collaborator the bridge needs (controller, slot content, template,
    /// factory) is absent. Raised at link/instantiation time.
    MissingDependency,
    /// A binding declaration or expression breaks the wiring contract. Raised
    /// at the specific binding-setup step.
    BindingContractViolation,
    /// Selector or expression text does not parse.
    ParseError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeError {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub guarantee: String,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl BridgeError {
    pub fn new(code: &str, kind: ErrorKind, message: &str) -> Self {
        Self::with_details(code, kind, message, None, vec![])
    }

    pub fn with_details(
        code: &str,
        kind: ErrorKind,
        message: &str,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        BridgeError {
            code: code.to_string(),
            kind,
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            context,
            hints,
        }
    }

    pub fn unsupported(code: &str, message: &str) -> Self {
        Self::new(code, ErrorKind::UnsupportedFeature, message)
    }

    pub fn missing(code: &str, message: &str) -> Self {
        Self::new(code, ErrorKind::MissingDependency, message)
    }

    pub fn binding(code: &str, message: &str) -> Self {
        Self::new(code, ErrorKind::BindingContractViolation, message)
    }

    pub fn parse(code: &str, message: &str) -> Self {
        Self::new(code, ErrorKind::ParseError, message)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for BridgeError {}
