//! Minimal DOM node model shared by both bridged frameworks.
//!
//! The bridge never owns a real browser DOM; it owns this tree. Two things
//! matter beyond plain structure:
//!
//! - every node carries an expando data map (the "controller data" slot).
//!   This is the sole cross-framework discovery mechanism: a bridged element
//!   stores, under a controller-name-derived key, either a pending
//!   `SyncPromise` or the resolved controller/injector.
//! - every node carries destroy callbacks. Teardown from either framework
//!   funnels through `destroy`, which fires them exactly once.
//!
//! `parse_fragment` converts html5ever/rcdom output into bridge nodes so
//! templates and transcluded content can be written as HTML text.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub type NodeHandle = Rc<BridgeNode>;

// ═══════════════════════════════════════════════════════════════════════════════
// NODE MODEL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: RefCell<Vec<(String, String)>>,
    },
    Text(RefCell<String>),
    Comment(String),
}

pub struct BridgeNode {
    pub kind: NodeKind,
    children: RefCell<Vec<NodeHandle>>,
    parent: RefCell<Weak<BridgeNode>>,
    expando: RefCell<HashMap<String, Rc<dyn Any>>>,
    destroy_callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

impl BridgeNode {
    pub fn new_element(tag: &str) -> NodeHandle {
        Self::new_element_with_attrs(tag, &[])
    }

    pub fn new_element_with_attrs(tag: &str, attrs: &[(&str, &str)]) -> NodeHandle {
        Rc::new(BridgeNode {
            kind: NodeKind::Element {
                tag: tag.to_lowercase(),
                attributes: RefCell::new(
                    attrs
                        .iter()
                        .map(|(name, value)| (name.to_lowercase(), value.to_string()))
                        .collect(),
                ),
            },
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            expando: RefCell::new(HashMap::new()),
            destroy_callbacks: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        })
    }

    pub fn new_text(contents: &str) -> NodeHandle {
        Rc::new(BridgeNode {
            kind: NodeKind::Text(RefCell::new(contents.to_string())),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            expando: RefCell::new(HashMap::new()),
            destroy_callbacks: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        })
    }

    pub fn new_comment(contents: &str) -> NodeHandle {
        Rc::new(BridgeNode {
            kind: NodeKind::Comment(contents.to_string()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            expando: RefCell::new(HashMap::new()),
            destroy_callbacks: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        })
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn text_content(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Text(contents) => Some(contents.borrow().clone()),
            _ => None,
        }
    }

    pub fn set_text(&self, contents: &str) {
        if let NodeKind::Text(existing) = &self.kind {
            *existing.borrow_mut() = contents.to_string();
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Attributes
    // ───────────────────────────────────────────────────────────────────────────

    pub fn attributes(&self) -> Vec<(String, String)> {
        match &self.kind {
            NodeKind::Element { attributes, .. } => attributes.borrow().clone(),
            _ => Vec::new(),
        }
    }

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        let wanted = name.to_lowercase();
        match &self.kind {
            NodeKind::Element { attributes, .. } => attributes
                .borrow()
                .iter()
                .find(|(attr_name, _)| *attr_name == wanted)
                .map(|(_, value)| value.clone()),
            _ => None,
        }
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        let wanted = name.to_lowercase();
        if let NodeKind::Element { attributes, .. } = &self.kind {
            let mut attrs = attributes.borrow_mut();
            if let Some(entry) = attrs.iter_mut().find(|(attr_name, _)| *attr_name == wanted) {
                entry.1 = value.to_string();
            } else {
                attrs.push((wanted, value.to_string()));
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Tree structure
    // ───────────────────────────────────────────────────────────────────────────

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent.borrow().upgrade()
    }

    pub fn children(&self) -> Vec<NodeHandle> {
        self.children.borrow().clone()
    }

    pub fn append_child(self: &Rc<Self>, child: NodeHandle) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child);
    }

    /// Extract the current children, detaching them from this node.
    /// Used once per adapter instance to capture light-DOM content before
    /// the element is recompiled.
    pub fn take_children(self: &Rc<Self>) -> Vec<NodeHandle> {
        let taken: Vec<NodeHandle> = self.children.borrow_mut().drain(..).collect();
        for child in &taken {
            *child.parent.borrow_mut() = Weak::new();
        }
        taken
    }

    pub fn replace_children(self: &Rc<Self>, nodes: Vec<NodeHandle>) {
        self.take_children();
        for node in nodes {
            self.append_child(node);
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Expando data (the cross-framework discovery channel)
    // ───────────────────────────────────────────────────────────────────────────

    pub fn set_data(&self, key: &str, value: Rc<dyn Any>) {
        self.expando.borrow_mut().insert(key.to_string(), value);
    }

    pub fn get_data(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.expando.borrow().get(key).cloned()
    }

    pub fn remove_data(&self, key: &str) {
        self.expando.borrow_mut().remove(key);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Destroy signal
    // ───────────────────────────────────────────────────────────────────────────

    pub fn on_destroy(&self, callback: impl FnOnce() + 'static) {
        if self.destroyed.get() {
            callback();
        } else {
            self.destroy_callbacks.borrow_mut().push(Box::new(callback));
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Fire destroy callbacks exactly once and clear the expando map so the
    /// node stops acting as a discovery channel.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        let callbacks: Vec<Box<dyn FnOnce()>> =
            self.destroy_callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback();
        }
        self.expando.borrow_mut().clear();
    }
}

impl std::fmt::Debug for BridgeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            NodeKind::Element { tag, .. } => write!(f, "<{}>", tag),
            NodeKind::Text(contents) => write!(f, "#text({:?})", contents.borrow()),
            NodeKind::Comment(contents) => write!(f, "<!--{}-->", contents),
        }
    }
}

/// The expando key under which a controller (or its pending promise) is
/// published for descendant elements: `$` + name + `Controller`.
pub fn controller_data_key(name: &str) -> String {
    format!("${}Controller", name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML FRAGMENT PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse an HTML fragment into bridge nodes.
///
/// html5ever always produces a full document; the html/head/body wrappers it
/// synthesizes are flattened away so the caller gets back exactly the
/// fragment's top-level nodes.
pub fn parse_fragment(html: &str) -> Vec<NodeHandle> {
    let dom = match parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(_) => return Vec::new(),
    };

    let mut nodes = Vec::new();
    collect_fragment_content(&dom.document, &mut nodes);
    nodes
}

fn collect_fragment_content(handle: &Handle, nodes: &mut Vec<NodeHandle>) {
    match &handle.data {
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                collect_fragment_content(child, nodes);
            }
        }
        NodeData::Element { name, .. } => {
            let tag = name.local.to_string().to_lowercase();
            // Synthesized wrapper tags are flattened; the fragment's own
            // elements convert one-to-one.
            if tag == "html" || tag == "head" || tag == "body" {
                for child in handle.children.borrow().iter() {
                    collect_fragment_content(child, nodes);
                }
            } else if let Some(node) = convert_dom_node(handle) {
                nodes.push(node);
            }
        }
        _ => {
            if let Some(node) = convert_dom_node(handle) {
                nodes.push(node);
            }
        }
    }
}

fn convert_dom_node(handle: &Handle) -> Option<NodeHandle> {
    match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.to_string();
            let element = BridgeNode::new_element(&tag);
            for attr in attrs.borrow().iter() {
                element.set_attribute(&attr.name.local.to_string(), &attr.value.to_string());
            }
            for child in handle.children.borrow().iter() {
                if let Some(converted) = convert_dom_node(child) {
                    element.append_child(converted);
                }
            }
            Some(element)
        }
        NodeData::Text { contents } => Some(BridgeNode::new_text(&contents.borrow().to_string())),
        NodeData::Comment { contents } => Some(BridgeNode::new_comment(&contents.to_string())),
        _ => None,
    }
}
