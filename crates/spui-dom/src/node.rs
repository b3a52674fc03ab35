#![forbid(unsafe_code)]

//! Headless element tree.
//!
//! [`MemoryNode`] is a shared handle to an element or text node held in
//! memory. It carries what the bindings and the list reconciler touch
//! (attributes, inline style, class name, text, children and event
//! handlers) and renders itself as HTML for inspection.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use crate::host::NodeHost;

/// Event handler; receives the node the event was dispatched on.
pub type EventHandler = Rc<dyn Fn(&MemoryNode)>;

enum NodeKind {
    Element(String),
    Text,
}

struct NodeData {
    kind: NodeKind,
    text: RefCell<String>,
    attributes: RefCell<BTreeMap<String, String>>,
    style: RefCell<Vec<(String, String)>>,
    children: RefCell<Vec<MemoryNode>>,
    handlers: RefCell<Vec<(String, EventHandler)>>,
    retained: RefCell<Vec<Box<dyn Any>>>,
}

/// Shared handle to an in-memory node. Equality is identity.
#[derive(Clone)]
pub struct MemoryNode {
    inner: Rc<NodeData>,
}

impl PartialEq for MemoryNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MemoryNode {}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            NodeKind::Element(tag) => f
                .debug_struct("MemoryNode")
                .field("tag", tag)
                .field("children", &self.child_count())
                .finish_non_exhaustive(),
            NodeKind::Text => f
                .debug_tuple("MemoryNode::Text")
                .field(&*self.inner.text.borrow())
                .finish(),
        }
    }
}

impl MemoryNode {
    fn with_kind(kind: NodeKind, text: String) -> Self {
        Self {
            inner: Rc::new(NodeData {
                kind,
                text: RefCell::new(text),
                attributes: RefCell::default(),
                style: RefCell::default(),
                children: RefCell::default(),
                handlers: RefCell::default(),
                retained: RefCell::default(),
            }),
        }
    }

    /// New element node; `tag` is stored lowercase.
    #[must_use]
    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeKind::Element(tag.to_ascii_lowercase()), String::new())
    }

    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Text, content.into())
    }

    /// Tag name, or `None` for a text node.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.inner.kind {
            NodeKind::Element(tag) => Some(tag),
            NodeKind::Text => None,
        }
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Text)
    }

    // --- text -------------------------------------------------------------

    /// Set a text node's value. On an element this replaces every child
    /// with one text node, like assigning `textContent`.
    pub fn set_text(&self, content: impl Into<String>) {
        let content = content.into();
        match self.inner.kind {
            NodeKind::Text => *self.inner.text.borrow_mut() = content,
            NodeKind::Element(_) => {
                *self.inner.children.borrow_mut() = vec![Self::text(content)];
            }
        }
    }

    /// Concatenated text of this node and its descendants.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self.inner.kind {
            NodeKind::Text => out.push_str(&self.inner.text.borrow()),
            NodeKind::Element(_) => {
                for child in self.inner.children.borrow().iter() {
                    child.collect_text(out);
                }
            }
        }
    }

    // --- attributes -------------------------------------------------------

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner
            .attributes
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Returns whether the attribute was present.
    pub fn remove_attribute(&self, name: &str) -> bool {
        self.inner.attributes.borrow_mut().remove(name).is_some()
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.attributes.borrow().contains_key(name)
    }

    /// All attributes, sorted by name.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .attributes
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn class_name(&self) -> String {
        self.attribute("class").unwrap_or_default()
    }

    pub fn set_class_name(&self, class: impl Into<String>) {
        self.set_attribute("class", class);
    }

    // --- inline style -----------------------------------------------------

    /// Set one declaration, keeping its position if already present. An
    /// empty value removes it.
    pub fn set_style_property(&self, property: &str, value: impl Into<String>) {
        let value = value.into();
        let mut style = self.inner.style.borrow_mut();
        let existing = style.iter().position(|(p, _)| p == property);
        match (existing, value.is_empty()) {
            (Some(i), true) => {
                style.remove(i);
            }
            (Some(i), false) => style[i].1 = value,
            (None, true) => {}
            (None, false) => style.push((property.to_owned(), value)),
        }
    }

    #[must_use]
    pub fn style_property(&self, property: &str) -> Option<String> {
        self.inner
            .style
            .borrow()
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v.clone())
    }

    /// Replace every declaration with those parsed from `css`
    /// (`prop: value;` pairs; malformed pieces are skipped).
    pub fn set_style_text(&self, css: &str) {
        let parsed = css
            .split(';')
            .filter_map(|decl| {
                let (prop, value) = decl.split_once(':')?;
                let (prop, value) = (prop.trim(), value.trim());
                (!prop.is_empty() && !value.is_empty())
                    .then(|| (prop.to_ascii_lowercase(), value.to_owned()))
            })
            .collect();
        *self.inner.style.borrow_mut() = parsed;
    }

    /// Serialized declarations, `prop: value;` separated by spaces.
    #[must_use]
    pub fn style_text(&self) -> String {
        self.inner
            .style
            .borrow()
            .iter()
            .map(|(p, v)| format!("{p}: {v};"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    // --- children ---------------------------------------------------------

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn append_child(&self, child: MemoryNode) {
        self.inner.children.borrow_mut().push(child);
    }

    #[must_use]
    pub fn children(&self) -> Vec<MemoryNode> {
        self.inner.children.borrow().clone()
    }

    #[must_use]
    pub fn child(&self, index: usize) -> Option<MemoryNode> {
        self.inner.children.borrow().get(index).cloned()
    }

    /// Position of `child` among this node's children.
    #[must_use]
    pub fn index_of(&self, child: &MemoryNode) -> Option<usize> {
        self.inner.children.borrow().iter().position(|c| c == child)
    }

    /// Swap `old` for `new` in place. Returns `false` when `old` is not a
    /// child of this node.
    pub fn replace_child(&self, new: MemoryNode, old: &MemoryNode) -> bool {
        let mut children = self.inner.children.borrow_mut();
        match children.iter().position(|c| c == old) {
            Some(i) => {
                children[i] = new;
                true
            }
            None => false,
        }
    }

    // --- events -----------------------------------------------------------

    pub fn on(&self, event: impl Into<String>, handler: impl Fn(&MemoryNode) + 'static) {
        let handler: EventHandler = Rc::new(handler);
        self.inner.handlers.borrow_mut().push((event.into(), handler));
    }

    /// Run the handlers registered for `event` in registration order and
    /// return how many ran.
    pub fn dispatch(&self, event: &str) -> usize {
        let handlers: Vec<EventHandler> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in &handlers {
            handler(self);
        }
        handlers.len()
    }

    // --- ownership --------------------------------------------------------

    /// Keep `value` alive for as long as this node lives.
    pub fn retain(&self, value: Box<dyn Any>) {
        self.inner.retained.borrow_mut().push(value);
    }

    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.inner.retained.borrow().len()
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakMemoryNode {
        WeakMemoryNode {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // --- rendering --------------------------------------------------------

    /// HTML serialization of this subtree.
    #[must_use]
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match &self.inner.kind {
            NodeKind::Text => escape_into(out, &self.inner.text.borrow(), false),
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in self.inner.attributes.borrow().iter() {
                    push_attribute(out, name, value);
                }
                let style = self.style_text();
                if !style.is_empty() {
                    push_attribute(out, "style", &style);
                }
                out.push('>');
                for child in self.inner.children.borrow().iter() {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    if !value.is_empty() {
        out.push_str("=\"");
        escape_into(out, value, true);
        out.push('"');
    }
}

fn escape_into(out: &mut String, text: &str, quotes: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if quotes => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

impl NodeHost for MemoryNode {
    type Node = MemoryNode;

    fn child_count(&self) -> usize {
        MemoryNode::child_count(self)
    }

    fn insert_children(&self, index: usize, nodes: Vec<MemoryNode>) {
        let mut children = self.inner.children.borrow_mut();
        let at = index.min(children.len());
        children.splice(at..at, nodes);
    }

    fn remove_children(&self, range: Range<usize>) -> Vec<MemoryNode> {
        let mut children = self.inner.children.borrow_mut();
        let end = range.end.min(children.len());
        let start = range.start.min(end);
        children.drain(start..end).collect()
    }
}

/// Non-owning handle to a [`MemoryNode`].
#[derive(Clone)]
pub struct WeakMemoryNode {
    inner: Weak<NodeData>,
}

impl WeakMemoryNode {
    #[must_use]
    pub fn upgrade(&self) -> Option<MemoryNode> {
        self.inner.upgrade().map(|inner| MemoryNode { inner })
    }
}

impl fmt::Debug for WeakMemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakMemoryNode")
    }
}
