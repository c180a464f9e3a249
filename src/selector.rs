//! CSS-like selector parsing and matching.
//!
//! Selectors route projected DOM content into slots and identify bridged
//! elements. The grammar is intentionally small: element names, classes,
//! `[attr]` / `[attr=value]` pairs, `:not(...)` negation, and `,`-separated
//! alternatives. Combinators are expressed structurally: a selector whose
//! predicates span element/class/attribute maps is registered through
//! "partial" matcher continuations and only matches when every predicate maps
//! onto the same candidate.
//!
//! Alternatives registered from one selector string share an already-matched
//! flag, so one list fires its callback at most once per match pass.

use lazy_static::lazy_static;
use regex::Regex;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{BridgeError, ERR_SELECTOR_MULTI_NOT, ERR_SELECTOR_NESTED_NOT};

// ═══════════════════════════════════════════════════════════════════════════════
// CSS SELECTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CssSelector {
    pub element: Option<String>,
    pub class_names: Vec<String>,
    /// Ordered (name, value) pairs; a presence-only predicate has an empty value.
    pub attrs: Vec<(String, String)>,
    pub not_selectors: Vec<CssSelector>,
}

lazy_static! {
    /// One token per alternation arm: `:not(`, element, `.class`,
    /// `[attr]` / `[attr=value]` (quoted or bare), `)`, `,`.
    static ref SELECTOR_RE: Regex = Regex::new(
        r#"(:not\()|([-\w]+)|(?:\.([-\w]+))|(?:\[([-.\w*$\\]+)(?:=(?:"([^\]"]*)"|'([^\]']*)'|([^\]"']*)))?\])|(\))|(\s*,\s*)"#
    )
    .expect("selector tokenizer regex");
}

impl CssSelector {
    /// Parse a selector string into its comma-separated alternatives.
    ///
    /// Total over the grammar except that `:not` may not be nested and may
    /// not contain comma-separated alternatives; both are hard errors.
    pub fn parse(selector: &str) -> Result<Vec<CssSelector>, BridgeError> {
        let mut results = Vec::new();
        let mut current = CssSelector::default();
        let mut negation: Option<CssSelector> = None;

        for caps in SELECTOR_RE.captures_iter(selector) {
            if caps.get(1).is_some() {
                if negation.is_some() {
                    return Err(BridgeError::parse(
                        ERR_SELECTOR_NESTED_NOT,
                        &format!("nesting :not() is not allowed in selector '{}'", selector),
                    ));
                }
                negation = Some(CssSelector::default());
            } else if let Some(element) = caps.get(2) {
                let target = negation.as_mut().unwrap_or(&mut current);
                target.set_element(element.as_str());
            } else if let Some(class_name) = caps.get(3) {
                let target = negation.as_mut().unwrap_or(&mut current);
                target.add_class_name(class_name.as_str());
            } else if let Some(attr_name) = caps.get(4) {
                let value = caps
                    .get(5)
                    .or_else(|| caps.get(6))
                    .or_else(|| caps.get(7))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                let target = negation.as_mut().unwrap_or(&mut current);
                target.add_attribute(attr_name.as_str(), value);
            } else if caps.get(8).is_some() {
                if let Some(sub) = negation.take() {
                    current.not_selectors.push(sub);
                }
            } else if caps.get(9).is_some() {
                if negation.is_some() {
                    return Err(BridgeError::parse(
                        ERR_SELECTOR_MULTI_NOT,
                        &format!(
                            "multiple selectors in :not() are not supported in '{}'",
                            selector
                        ),
                    ));
                }
                Self::add_result(&mut results, std::mem::take(&mut current));
            }
        }

        // An unterminated :not still contributes its negation.
        if let Some(sub) = negation.take() {
            current.not_selectors.push(sub);
        }
        Self::add_result(&mut results, current);
        Ok(results)
    }

    /// A selector with no positive predicates matches any element.
    fn add_result(results: &mut Vec<CssSelector>, mut selector: CssSelector) {
        if selector.element.is_none()
            && selector.class_names.is_empty()
            && selector.attrs.is_empty()
        {
            selector.element = Some("*".to_string());
        }
        results.push(selector);
    }

    /// Build the candidate descriptor for a DOM element: its tag, its
    /// attributes, and the `class` attribute exploded into class predicates.
    pub fn for_element(tag: &str, attrs: &[(String, String)]) -> CssSelector {
        let mut selector = CssSelector::default();
        selector.set_element(tag);
        for (name, value) in attrs {
            selector.add_attribute(name, value);
            if name.eq_ignore_ascii_case("class") {
                for class_name in value.split_whitespace() {
                    selector.add_class_name(class_name);
                }
            }
        }
        selector
    }

    pub fn set_element(&mut self, element: &str) {
        self.element = Some(element.to_lowercase());
    }

    pub fn add_class_name(&mut self, name: &str) {
        self.class_names.push(name.to_lowercase());
    }

    pub fn add_attribute(&mut self, name: &str, value: &str) {
        self.attrs
            .push((name.to_lowercase(), value.to_lowercase()));
    }

    pub fn is_wildcard(&self) -> bool {
        self.element.as_deref() == Some("*")
            && self.class_names.is_empty()
            && self.attrs.is_empty()
            && self.not_selectors.is_empty()
    }
}

impl fmt::Display for CssSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(element) = &self.element {
            write!(f, "{}", element)?;
        }
        for class_name in &self.class_names {
            write!(f, ".{}", class_name)?;
        }
        for (name, value) in &self.attrs {
            if value.is_empty() {
                write!(f, "[{}]", name)?;
            } else {
                write!(f, "[{}={}]", name, value)?;
            }
        }
        for sub in &self.not_selectors {
            write!(f, ":not({})", sub)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTOR MATCHER
// ═══════════════════════════════════════════════════════════════════════════════

struct ListContext {
    already_matched: Cell<bool>,
}

struct SelectorContext<T> {
    selector: CssSelector,
    context: T,
    list_context: Option<Rc<ListContext>>,
}

impl<T> SelectorContext<T> {
    fn already_matched(&self) -> bool {
        self.list_context
            .as_ref()
            .map(|lc| lc.already_matched.get())
            .unwrap_or(false)
    }

    fn finalize(
        &self,
        candidate: &CssSelector,
        callback: Option<&mut (dyn FnMut(&CssSelector, &T) + '_)>,
    ) -> bool {
        let mut result = true;
        if !self.selector.not_selectors.is_empty() && !self.already_matched() {
            let mut not_matcher: SelectorMatcher<()> = SelectorMatcher::new();
            not_matcher.add_selectables(self.selector.not_selectors.clone(), ());
            result = !not_matcher.match_candidate(candidate, None);
        }
        if result && !self.already_matched() {
            if let Some(callback) = callback {
                if let Some(lc) = &self.list_context {
                    lc.already_matched.set(true);
                }
                callback(&self.selector, &self.context);
            }
        }
        result
    }
}

/// A registered set of selectors, indexed for fast candidate matching.
///
/// Terminal maps hold selectors whose last predicate lands on that key;
/// partial maps hold nested matchers continuing a multi-predicate selector.
pub struct SelectorMatcher<T> {
    element_map: HashMap<String, Vec<SelectorContext<T>>>,
    element_partial_map: HashMap<String, Box<SelectorMatcher<T>>>,
    class_map: HashMap<String, Vec<SelectorContext<T>>>,
    class_partial_map: HashMap<String, Box<SelectorMatcher<T>>>,
    attr_value_map: HashMap<String, HashMap<String, Vec<SelectorContext<T>>>>,
    attr_value_partial_map: HashMap<String, HashMap<String, Box<SelectorMatcher<T>>>>,
    list_contexts: Vec<Rc<ListContext>>,
}

impl<T: Clone + 'static> SelectorMatcher<T> {
    pub fn new() -> Self {
        SelectorMatcher {
            element_map: HashMap::new(),
            element_partial_map: HashMap::new(),
            class_map: HashMap::new(),
            class_partial_map: HashMap::new(),
            attr_value_map: HashMap::new(),
            attr_value_partial_map: HashMap::new(),
            list_contexts: Vec::new(),
        }
    }

    /// Register the alternatives of one selector string under a shared
    /// already-matched flag: at most one of them reports per match pass.
    pub fn add_selectables(&mut self, selectors: Vec<CssSelector>, context: T) {
        let list_context = if selectors.len() > 1 {
            let lc = Rc::new(ListContext {
                already_matched: Cell::new(false),
            });
            self.list_contexts.push(lc.clone());
            Some(lc)
        } else {
            None
        };
        for selector in selectors {
            self.add_selectable(selector, context.clone(), list_context.clone());
        }
    }

    fn add_selectable(
        &mut self,
        selector: CssSelector,
        context: T,
        list_context: Option<Rc<ListContext>>,
    ) {
        let element = selector.element.clone();
        let class_names = selector.class_names.clone();
        let attrs = selector.attrs.clone();
        let selectable = SelectorContext {
            selector,
            context,
            list_context,
        };

        // Walk partial continuations down to the matcher owning the terminal
        // predicate, then insert once.
        let mut matcher: &mut SelectorMatcher<T> = self;

        if let Some(element) = &element {
            if class_names.is_empty() && attrs.is_empty() {
                matcher
                    .element_map
                    .entry(element.clone())
                    .or_default()
                    .push(selectable);
                return;
            }
            matcher = &mut **matcher
                .element_partial_map
                .entry(element.clone())
                .or_insert_with(|| Box::new(SelectorMatcher::new()));
        }

        for (i, class_name) in class_names.iter().enumerate() {
            if attrs.is_empty() && i == class_names.len() - 1 {
                matcher
                    .class_map
                    .entry(class_name.clone())
                    .or_default()
                    .push(selectable);
                return;
            }
            matcher = &mut **matcher
                .class_partial_map
                .entry(class_name.clone())
                .or_insert_with(|| Box::new(SelectorMatcher::new()));
        }

        for (i, (name, value)) in attrs.iter().enumerate() {
            if i == attrs.len() - 1 {
                matcher
                    .attr_value_map
                    .entry(name.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .push(selectable);
                return;
            }
            matcher = &mut **matcher
                .attr_value_partial_map
                .entry(name.clone())
                .or_default()
                .entry(value.clone())
                .or_insert_with(|| Box::new(SelectorMatcher::new()));
        }
    }

    /// Match a candidate descriptor against the registered selectors.
    ///
    /// Returns true if any selector matched. The callback fires once per
    /// matching selector (once per shared list), in registration order
    /// within each terminal list, with `*`-keyed entries after specific ones.
    pub fn match_candidate(
        &self,
        candidate: &CssSelector,
        mut callback: Option<&mut (dyn FnMut(&CssSelector, &T) + '_)>,
    ) -> bool {
        for lc in &self.list_contexts {
            lc.already_matched.set(false);
        }

        let mut result = false;
        let element = candidate.element.clone().unwrap_or_default();

        result = Self::match_terminal(
            &self.element_map,
            &element,
            candidate,
            callback.as_deref_mut(),
        ) || result;
        result = self.match_partial(
            &self.element_partial_map,
            &element,
            candidate,
            callback.as_deref_mut(),
        ) || result;

        for class_name in &candidate.class_names {
            result = Self::match_terminal(
                &self.class_map,
                class_name,
                candidate,
                callback.as_deref_mut(),
            ) || result;
            result = self.match_partial(
                &self.class_partial_map,
                class_name,
                candidate,
                callback.as_deref_mut(),
            ) || result;
        }

        for (name, value) in &candidate.attrs {
            if let Some(terminal_values) = self.attr_value_map.get(name) {
                // Presence-only registrations live under the empty value.
                if !value.is_empty() {
                    result = Self::match_terminal_list(
                        terminal_values.get(""),
                        candidate,
                        callback.as_deref_mut(),
                    ) || result;
                }
                result = Self::match_terminal_list(
                    terminal_values.get(value),
                    candidate,
                    callback.as_deref_mut(),
                ) || result;
            }
            if let Some(partial_values) = self.attr_value_partial_map.get(name) {
                if !value.is_empty() {
                    if let Some(nested) = partial_values.get("") {
                        result = nested.match_candidate(candidate, callback.as_deref_mut())
                            || result;
                    }
                }
                if let Some(nested) = partial_values.get(value) {
                    result =
                        nested.match_candidate(candidate, callback.as_deref_mut()) || result;
                }
            }
        }

        result
    }

    fn match_terminal(
        map: &HashMap<String, Vec<SelectorContext<T>>>,
        name: &str,
        candidate: &CssSelector,
        mut callback: Option<&mut (dyn FnMut(&CssSelector, &T) + '_)>,
    ) -> bool {
        let mut result =
            Self::match_terminal_list(map.get(name), candidate, callback.as_deref_mut());
        if name != "*" {
            result =
                Self::match_terminal_list(map.get("*"), candidate, callback.as_deref_mut())
                    || result;
        }
        result
    }

    fn match_terminal_list(
        selectables: Option<&Vec<SelectorContext<T>>>,
        candidate: &CssSelector,
        mut callback: Option<&mut (dyn FnMut(&CssSelector, &T) + '_)>,
    ) -> bool {
        let mut result = false;
        if let Some(selectables) = selectables {
            for selectable in selectables {
                result = selectable.finalize(candidate, callback.as_deref_mut()) || result;
            }
        }
        result
    }

    fn match_partial(
        &self,
        map: &HashMap<String, Box<SelectorMatcher<T>>>,
        name: &str,
        candidate: &CssSelector,
        callback: Option<&mut (dyn FnMut(&CssSelector, &T) + '_)>,
    ) -> bool {
        match map.get(name) {
            Some(nested) => nested.match_candidate(candidate, callback),
            None => false,
        }
    }
}

impl<T: Clone + 'static> Default for SelectorMatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}
