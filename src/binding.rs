//! Binding descriptors shared by both adapters.
//!
//! `PropertyBinding` derives, once per declared input/output, every syntactic
//! form the template attribute may take. `BindingMode` is the parsed form of
//! the legacy one-character binding sigils. `Bindings` is the outbound
//! adapter's immutable descriptor set, built a single time when a directive
//! definition is first inspected.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::error::{BridgeError, ERR_BINDING_BAD_SIGIL};
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE NAME DERIVATION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// One declared input/output and the five template-attribute variants it may
/// appear under. Created once and reused for the adapter's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBinding {
    pub prop: String,
    pub attr: String,
    pub bracket_attr: String,
    pub paren_attr: String,
    pub bracket_paren_attr: String,
    pub on_attr: String,
    pub bind_attr: String,
    pub bindon_attr: String,
}

impl PropertyBinding {
    pub fn new(prop: &str, attr: &str) -> Self {
        let capital = capitalize(&camelize(attr));
        PropertyBinding {
            prop: prop.to_string(),
            attr: attr.to_string(),
            bracket_attr: format!("[{}]", attr),
            paren_attr: format!("({})", attr),
            bracket_paren_attr: format!("[({})]", attr),
            on_attr: format!("on{}", capital),
            bind_attr: format!("bind{}", capital),
            bindon_attr: format!("bindon{}", capital),
        }
    }

    /// Parse a `"prop: attr"` spec; a bare `"prop"` maps the property onto
    /// an attribute of the same name.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((prop, attr)) => PropertyBinding::new(prop.trim(), attr.trim()),
            None => {
                let name = spec.trim();
                PropertyBinding::new(name, name)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGIL GRAMMAR
// ═══════════════════════════════════════════════════════════════════════════════

/// The parsed form of a legacy binding declaration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingMode {
    /// `@`: interpolated attribute, flows in as text.
    Attribute,
    /// `<`: one-way expression input.
    OneWay,
    /// `=`: two-way, an input plus the paired synthetic `<prop>Change` output.
    TwoWay,
    /// `&`: callback expression, surfaced as an output.
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDef {
    pub property: String,
    pub mode: BindingMode,
    pub optional: bool,
    /// The template attribute carrying the binding; defaults to the property
    /// name when the declaration names no alternate.
    pub attr: String,
}

lazy_static! {
    static ref SIGIL_RE: Regex =
        Regex::new(r"^\s*([@<=&])(\??)\s*([\w-]*)\s*$").expect("binding sigil regex");
}

/// Parse one `property: "sigil[?][attr]"` entry of a binding declaration map.
pub fn parse_binding_definition(
    property: &str,
    definition: &str,
) -> Result<BindingDef, BridgeError> {
    let caps = SIGIL_RE.captures(definition).ok_or_else(|| {
        BridgeError::binding(
            ERR_BINDING_BAD_SIGIL,
            &format!(
                "unexpected mapping '{}' of property '{}'",
                definition, property
            ),
        )
    })?;

    let mode = match &caps[1] {
        "@" => BindingMode::Attribute,
        "<" => BindingMode::OneWay,
        "=" => BindingMode::TwoWay,
        _ => BindingMode::Expression,
    };
    let optional = &caps[2] == "?";
    let alternate = caps[3].trim();
    let attr = if alternate.is_empty() {
        property.to_string()
    } else {
        alternate.to_string()
    };

    Ok(BindingDef {
        property: property.to_string(),
        mode,
        optional,
        attr,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTBOUND DESCRIPTOR SET
// ═══════════════════════════════════════════════════════════════════════════════

/// The synthetic output paired with a two-way property.
pub fn synthetic_output_name(prop: &str) -> String {
    format!("{}Change", prop)
}

/// Immutable classification of a directive's binding declarations, built once
/// when the definition is first inspected. The last-values cache is the only
/// mutable part; it backs the NaN-safe do-check comparison.
#[derive(Default)]
pub struct Bindings {
    pub two_way_bound_properties: Vec<String>,
    pub two_way_last_values: RefCell<Vec<Value>>,
    pub expression_bound_properties: Vec<String>,
    pub property_to_output_map: BTreeMap<String, String>,
}

impl Bindings {
    pub fn from_definitions(
        definitions: &BTreeMap<String, String>,
    ) -> Result<Bindings, BridgeError> {
        let mut bindings = Bindings::default();
        for (property, definition) in definitions {
            let def = parse_binding_definition(property, definition)?;
            match def.mode {
                // Plain inputs are driven by the host; nothing to track here.
                BindingMode::Attribute | BindingMode::OneWay => {}
                BindingMode::TwoWay => {
                    bindings.two_way_bound_properties.push(property.clone());
                    bindings.two_way_last_values.borrow_mut().push(Value::Null);
                    bindings
                        .property_to_output_map
                        .insert(property.clone(), synthetic_output_name(property));
                }
                BindingMode::Expression => {
                    bindings.expression_bound_properties.push(property.clone());
                }
            }
        }
        Ok(bindings)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHANGE RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyChange {
    pub previous_value: Value,
    pub current_value: Value,
    first_change: bool,
}

impl PropertyChange {
    pub fn new(previous_value: Value, current_value: Value, first_change: bool) -> Self {
        PropertyChange {
            previous_value,
            current_value,
            first_change,
        }
    }

    pub fn is_first_change(&self) -> bool {
        self.first_change
    }
}

/// One batched change notification: property name to its change record.
pub type Changes = HashMap<String, PropertyChange>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_for_distinct_attr() {
        let binding = PropertyBinding::new("title", "my-title");
        assert_eq!(binding.attr, "my-title");
        assert_eq!(binding.bracket_attr, "[my-title]");
        assert_eq!(binding.paren_attr, "(my-title)");
        assert_eq!(binding.bracket_paren_attr, "[(my-title)]");
        assert_eq!(binding.on_attr, "onMyTitle");
        assert_eq!(binding.bind_attr, "bindMyTitle");
        assert_eq!(binding.bindon_attr, "bindonMyTitle");
    }

    #[test]
    fn test_variants_collapse_when_attr_equals_prop() {
        let binding = PropertyBinding::new("title", "title");
        assert_eq!(binding.attr, "title");
        assert_eq!(binding.bracket_attr, "[title]");
        assert_eq!(binding.on_attr, "onTitle");
        assert_eq!(binding.bind_attr, "bindTitle");
        assert_eq!(binding.bindon_attr, "bindonTitle");
    }

    #[test]
    fn test_parse_spec_with_alternate_attr() {
        let binding = PropertyBinding::parse("title: my-title");
        assert_eq!(binding.prop, "title");
        assert_eq!(binding.attr, "my-title");
    }

    #[test]
    fn test_sigil_parsing() {
        let def = parse_binding_definition("count", "=?total").unwrap();
        assert_eq!(def.mode, BindingMode::TwoWay);
        assert!(def.optional);
        assert_eq!(def.attr, "total");

        let def = parse_binding_definition("label", "@").unwrap();
        assert_eq!(def.mode, BindingMode::Attribute);
        assert!(!def.optional);
        assert_eq!(def.attr, "label");

        let def = parse_binding_definition("onSave", "&").unwrap();
        assert_eq!(def.mode, BindingMode::Expression);
    }

    #[test]
    fn test_unknown_sigil_fails_echoing_definition() {
        let err = parse_binding_definition("count", "%total").unwrap_err();
        assert_eq!(err.code, ERR_BINDING_BAD_SIGIL);
        assert!(err.message.contains("%total"));
        assert!(err.message.contains("count"));
    }

    #[test]
    fn test_bindings_classification() {
        let mut defs = BTreeMap::new();
        defs.insert("value".to_string(), "=".to_string());
        defs.insert("label".to_string(), "@".to_string());
        defs.insert("onSelect".to_string(), "&".to_string());
        defs.insert("data".to_string(), "<".to_string());

        let bindings = Bindings::from_definitions(&defs).unwrap();
        assert_eq!(bindings.two_way_bound_properties, vec!["value"]);
        assert_eq!(bindings.expression_bound_properties, vec!["onSelect"]);
        assert_eq!(
            bindings.property_to_output_map.get("value").map(String::as_str),
            Some("valueChange")
        );
        assert_eq!(bindings.two_way_last_values.borrow().len(), 1);
    }
}
